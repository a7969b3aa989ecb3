use uuid::Uuid;

/// Identifies the device issuing a sync operation and whether it is
/// currently offline. This replaces the teacher's multi-user `AuthContext`:
/// the sync core has no notion of roles or permissions, only "which device
/// is this, and did this write originate locally or from a remote apply".
#[derive(Debug, Clone)]
pub struct DeviceContext {
    pub device_id: Uuid,
    pub offline_mode: bool,
}

impl DeviceContext {
    pub fn new(device_id: Uuid, offline_mode: bool) -> Self {
        Self { device_id, offline_mode }
    }
}
