//! Runner lifecycle tests against isolated runtimes.

use std::sync::Arc;
use std::thread;

use nfd_service::config::ConfigBootstrap;
use nfd_service::forwarder::{FaceId, ManagementError, ANY_SIGNER};
use nfd_service::lifecycle::{RunError, RunState, Runner};
use nfd_service::routing::{Route, RouteOrigin, RIB_MANAGEMENT_PREFIX};
use nfd_service::runtime::GlobalRuntime;
use nfd_service::security::KeyChain;

mod common;

fn build(runtime: &Arc<GlobalRuntime>, home: &std::path::Path) -> Runner {
    let keychain = KeyChain::open(home).unwrap();
    Runner::construct(
        Arc::clone(runtime),
        ConfigBootstrap::default_config(),
        keychain,
    )
    .unwrap()
}

#[test]
fn run_serve_and_stop() {
    let runtime = Arc::new(GlobalRuntime::new());
    let home = common::temp_home();
    let runner = Arc::new(build(&runtime, home.path()));
    let client = runner.forwarder_client().unwrap();
    let rib = runner.rib_handle().unwrap();

    let worker = {
        let runner = Arc::clone(&runner);
        thread::spawn(move || runner.start())
    };
    assert!(common::wait_until(common::TIMEOUT, || runner.state()
        == RunState::Running));

    // The RIB registers its own management prefix once the reactor runs.
    assert!(common::wait_until(common::TIMEOUT, || {
        rib.routes().iter().any(|r| r.prefix == RIB_MANAGEMENT_PREFIX)
    }));

    rib.register_route_blocking(Route::new("/example/app", FaceId::INTERNAL, RouteOrigin::App, 10))
        .unwrap();
    let status = client.status_blocking().unwrap();
    assert_eq!(status.fib_entries, 2);
    assert_eq!(status.channels, 3);
    assert_eq!(status.cs_capacity, 100);

    let unknown_face = Route::new("/example/other", FaceId::from_raw(999), RouteOrigin::App, 10);
    assert!(matches!(
        rib.register_route_blocking(unknown_face),
        Err(ManagementError::InvalidCommand(_))
    ));

    assert_eq!(rib.unregister_route_blocking("/example/app", FaceId::INTERNAL), Ok(1));
    assert_eq!(client.status_blocking().unwrap().fib_entries, 1);

    runner.stop();
    runner.stop();
    worker.join().unwrap().unwrap();

    assert_eq!(runner.state(), RunState::Idle);
    assert!(runner.forwarder_client().is_none());
    assert_eq!(client.status_blocking(), Err(ManagementError::Unavailable));
    assert!(rib.register_route_blocking(Route::new("/late", FaceId::INTERNAL, RouteOrigin::App, 1)).is_err());
}

#[test]
fn rejected_update_keeps_previous_route() {
    let runtime = Arc::new(GlobalRuntime::new());
    let home = common::temp_home();
    let runner = Arc::new(build(&runtime, home.path()));
    let client = runner.forwarder_client().unwrap();
    let rib = runner.rib_handle().unwrap();

    let worker = {
        let runner = Arc::clone(&runner);
        thread::spawn(move || runner.start())
    };
    assert!(common::wait_until(common::TIMEOUT, || runner.state()
        == RunState::Running));

    let face = client
        .create_face_blocking(ANY_SIGNER, "tcp4://192.0.2.1:6363")
        .unwrap();
    let original = Route::new("/example/app", face, RouteOrigin::App, 10);
    rib.register_route_blocking(original.clone()).unwrap();
    assert_eq!(client.next_hops_blocking("/example/app/data").unwrap()[0].face, face);

    assert_eq!(client.destroy_face_blocking(ANY_SIGNER, face), Ok(true));
    let update = Route::new("/example/app", face, RouteOrigin::App, 5);
    assert!(matches!(
        rib.register_route_blocking(update),
        Err(ManagementError::InvalidCommand(_))
    ));
    assert!(rib.routes().contains(&original));

    runner.stop();
    worker.join().unwrap().unwrap();
}

#[test]
fn finished_run_leaves_runtime_pristine() {
    let runtime = Arc::new(GlobalRuntime::new());
    let home = common::temp_home();
    let runner = build(&runtime, home.path());
    let handle = runner.handle();
    assert!(runtime.scheduler().pending() >= 1);

    let stopper = thread::spawn(move || {
        assert!(common::wait_until(common::TIMEOUT, || handle.state()
            == RunState::Running));
        handle.stop();
    });
    runner.start().unwrap();
    stopper.join().unwrap();

    let snapshot = runtime.snapshot();
    assert!(snapshot.is_pristine(), "{snapshot:?}");
    assert_eq!(snapshot.reactor_resets, 1);
    assert!(matches!(runner.start(), Err(RunError::Finished)));

    drop(runner);
    assert!(runtime.is_pristine());
}

#[test]
fn stop_before_start_is_honoured() {
    let runtime = Arc::new(GlobalRuntime::new());
    let home = common::temp_home();
    let runner = build(&runtime, home.path());

    runner.stop();
    assert_eq!(runner.state(), RunState::Stopping);
    runner.start().unwrap();
    assert_eq!(runner.state(), RunState::Idle);
}

#[test]
fn drop_without_start_cleans_up() {
    let runtime = Arc::new(GlobalRuntime::new());
    let home = common::temp_home();
    let runner = build(&runtime, home.path());
    let handle = runner.handle();

    drop(runner);
    assert_eq!(handle.state(), RunState::Idle);
    assert!(runtime.is_pristine());
    handle.stop();
}

#[test]
fn successive_runners_share_one_runtime() {
    let runtime = Arc::new(GlobalRuntime::new());
    let home = common::temp_home();

    for _ in 0..3 {
        runtime.reset();
        let runner = build(&runtime, home.path());
        runner.stop();
        runner.start().unwrap();
        drop(runner);
        runtime.reset();
        assert!(runtime.is_pristine());
    }
    assert_eq!(runtime.reset_count(), 6);
}
