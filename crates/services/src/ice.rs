use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bson::oid::ObjectId;
use hirewire_config::IceSettings;
use hirewire_db::models::IceServer;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const DEFAULT_CREDENTIAL_TTL_SECS: u64 = 86400;

/// ICE configuration snapshot captured onto a call at start and handed to
/// joining peers verbatim.
pub fn snapshot(settings: &IceSettings, user_id: &ObjectId) -> (Vec<String>, Vec<IceServer>) {
    let stun = settings.stun_servers.clone();

    let turn = match settings.turn.url {
        Some(ref url) => {
            let (username, credential) = if let Some(ref secret) = settings.turn.shared_secret {
                ephemeral_credentials(secret, user_id, settings.turn.credential_ttl_secs)
            } else {
                (
                    settings.turn.username.clone().unwrap_or_default(),
                    settings.turn.password.clone().unwrap_or_default(),
                )
            };

            // UDP TURN often fails behind NAT/firewalls, so include TCP and
            // TLS fallbacks alongside the configured URL.
            let mut urls: Vec<String> = vec![url.clone()];
            if url.starts_with("turn:") && !url.contains("?transport=") {
                urls.push(format!("{url}?transport=tcp"));
                let turns_url = url.replacen("turn:", "turns:", 1).replace(":3478", ":5349");
                urls.push(format!("{turns_url}?transport=tcp"));
            }

            vec![IceServer {
                urls,
                username: Some(username),
                credential: Some(credential),
            }]
        }
        None => Vec::new(),
    };

    (stun, turn)
}

/// Time-limited TURN credentials in the `expiry:user` / HMAC-SHA1 scheme
/// understood by coturn-style servers.
fn ephemeral_credentials(
    secret: &str,
    user_id: &ObjectId,
    ttl_secs: Option<u64>,
) -> (String, String) {
    let expiry = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        + ttl_secs.unwrap_or(DEFAULT_CREDENTIAL_TTL_SECS);
    let username = format!("{}:{}", expiry, user_id.to_hex());
    let mut mac =
        Hmac::<Sha1>::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(username.as_bytes());
    let credential = BASE64.encode(mac.finalize().into_bytes());
    debug!(%username, "Generated TURN ephemeral credentials");
    (username, credential)
}
