//! Signal teardown tests
//!
//! The listener count is process-wide, so these tests run serialized in their
//! own test binary.

use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use skillmux_mcp::{active_signal_listeners, SkillMcpManager};
use tests::fixtures::{identity, stdio_context};
use tests::{test_config, MockTransportFactory};

static SERIAL: Mutex<()> = Mutex::new(());

fn signal_manager(factory: &MockTransportFactory) -> SkillMcpManager {
    SkillMcpManager::builder(test_config().with_signal_handling(true))
        .with_transport_factory(factory.as_factory())
        .build()
}

#[tokio::test]
async fn test_repeated_lifecycles_do_not_accumulate_listeners() {
    let _serial = SERIAL.lock();
    let baseline = active_signal_listeners();
    let factory = MockTransportFactory::new();
    let manager = signal_manager(&factory);

    for round in 0..5 {
        manager
            .get_or_create_client(&identity("s1", "search"), &stdio_context())
            .await
            .unwrap();
        manager
            .get_or_create_client(&identity("s1", "files"), &stdio_context())
            .await
            .unwrap();
        assert!(manager.has_signal_handlers(), "round {round}");
        assert_eq!(active_signal_listeners(), baseline + 1, "round {round}");

        manager.disconnect_all().await;
        assert!(!manager.has_signal_handlers(), "round {round}");
        assert_eq!(active_signal_listeners(), baseline, "round {round}");
    }
}

#[tokio::test]
async fn test_listener_survives_session_disconnect_until_drop() {
    let _serial = SERIAL.lock();
    let baseline = active_signal_listeners();
    let factory = MockTransportFactory::new();
    let manager = signal_manager(&factory);

    manager
        .get_or_create_client(&identity("s1", "search"), &stdio_context())
        .await
        .unwrap();
    manager.disconnect_session("s1").await;
    assert!(manager.has_signal_handlers());
    assert_eq!(active_signal_listeners(), baseline + 1);

    drop(manager);
    assert_eq!(active_signal_listeners(), baseline);
}

#[tokio::test]
async fn test_disabled_signal_handling_installs_nothing() {
    let _serial = SERIAL.lock();
    let baseline = active_signal_listeners();
    let factory = MockTransportFactory::new();
    let manager = tests::mock_manager(&factory);

    manager
        .get_or_create_client(&identity("s1", "search"), &stdio_context())
        .await
        .unwrap();

    assert!(!manager.has_signal_handlers());
    assert_eq!(active_signal_listeners(), baseline);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_sigterm_closes_every_client() {
    let _serial = SERIAL.lock();
    let baseline = active_signal_listeners();
    let factory = MockTransportFactory::new();
    let manager = signal_manager(&factory);
    let search = identity("s1", "search");
    let files = identity("s2", "files");

    manager.get_or_create_client(&search, &stdio_context()).await.unwrap();
    manager.get_or_create_client(&files, &stdio_context()).await.unwrap();
    assert_eq!(active_signal_listeners(), baseline + 1);

    let status = tokio::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .await
        .unwrap();
    assert!(status.success());

    tokio::time::timeout(Duration::from_secs(5), async {
        while factory.close_count() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("teardown should close both clients");

    assert!(!manager.is_connected(&search));
    assert!(!manager.is_connected(&files));
    assert!(!manager.has_signal_handlers());
    assert!(!manager.is_cleanup_running());
    assert_eq!(active_signal_listeners(), baseline);
}
