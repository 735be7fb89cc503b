use serde::Serialize;
use utoipa::ToSchema;

/// Payload of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `"ok"` while a session store is installed, `"degraded"` once the
    /// backend lost it and game traffic answers 503.
    pub status: String,
}

impl HealthResponse {
    /// The session store is reachable and game operations are served.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }

    /// No session store is installed; game operations answer 503 until a
    /// reconnect succeeds.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
        }
    }
}
