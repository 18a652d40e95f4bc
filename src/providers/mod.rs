//! Providers for the shared state and the long-running services.

pub mod app_state;
pub mod overrides;
pub mod reconciler;
pub mod status_display;
pub mod traits;

pub use app_state::AppStateProvider;
pub use overrides::ManualOverrideServiceProvider;
pub use reconciler::StateReconcilerServiceProvider;
pub use status_display::StatusDisplayServiceProvider;
pub use traits::{AsyncProvider, ServiceProvider};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::{
        app_context::AppState,
        config::{Config, ConfigManager},
        event::EventBus,
        hardware::HardwareSet,
        remote::testing::MemoryStore,
        slots::Roster,
    };
    use pretty_assertions::assert_eq;
    use std::{collections::HashMap, path::PathBuf, sync::Arc};

    fn create_test_state() -> (Arc<AppState>, Arc<Roster>) {
        let config = Config::default();
        let (hardware, _probes) = HardwareSet::simulated(&config);
        let state = AppState::from_parts(
            ConfigManager::new(config, PathBuf::from("/tmp/test.yml")),
            Arc::new(MemoryStore::default()),
            hardware,
        );
        let roster = Roster::bind(
            vec!["Aspirin".to_string(), "Vitamin".to_string()],
            HashMap::new(),
            &state.actuators,
            state.indicators.len(),
        );
        (Arc::new(state), Arc::new(roster))
    }

    fn all_services(state: &Arc<AppState>, roster: &Arc<Roster>) -> Vec<Box<dyn ServiceProvider>> {
        let bus = EventBus::new();
        vec![
            Box::new(StatusDisplayServiceProvider::new(state.clone(), roster.clone())),
            Box::new(ManualOverrideServiceProvider::new(
                state.clone(),
                roster.clone(),
                bus.clone(),
            )),
            Box::new(StateReconcilerServiceProvider::new(
                state.clone(),
                roster.clone(),
                bus,
            )),
        ]
    }

    #[tokio::test]
    async fn services_sort_by_priority() {
        let (state, roster) = create_test_state();
        let mut services = all_services(&state, &roster);

        services.sort_by_key(|s| std::cmp::Reverse(s.priority()));
        let names: Vec<_> = services.iter().map(|s| s.name()).collect();

        assert_eq!(names, vec!["StateReconciler", "ManualOverride", "StatusDisplay"]);
    }

    #[tokio::test]
    async fn only_the_reconciler_is_critical() {
        let (state, roster) = create_test_state();

        for service in all_services(&state, &roster) {
            assert_eq!(service.is_critical(), service.name() == "StateReconciler");
        }
    }

    #[tokio::test]
    async fn one_reconciler_per_slot_and_a_single_display_loop() {
        let (state, roster) = create_test_state();
        let mut tm = crate::task_manager::TaskManager::new();

        for service in all_services(&state, &roster) {
            service.start(&mut tm).await.unwrap();
        }

        assert_eq!(
            tm.task_names(),
            vec![
                "StatusDisplay",
                "ManualOverride",
                "reconciler:Aspirin",
                "reconciler:Vitamin"
            ]
        );
        tm.shutdown_all().await.unwrap();
    }
}
