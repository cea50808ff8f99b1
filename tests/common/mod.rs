//! Shared fixtures for integration tests: an in-memory, migrated `Core`.

use fleetwork_core::config::Settings;
use fleetwork_core::Core;

pub async fn test_core() -> Core {
    Core::in_memory(Settings::default()).await.expect("in-memory core should build")
}
