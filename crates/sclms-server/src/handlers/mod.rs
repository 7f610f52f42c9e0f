pub mod admin;
pub mod auth;
pub mod two_factor;

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

impl Message {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

pub async fn health() -> &'static str {
    "ok"
}
