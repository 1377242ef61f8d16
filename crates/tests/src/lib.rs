pub mod fixtures;

#[cfg(test)]
mod call_lifecycle_tests;
