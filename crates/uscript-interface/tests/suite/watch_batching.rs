use super::util::{connect, install_recorder, read_event, send_command, wait_for_callback};

use uscript_interface::Service;
use uscript_wire::{Command, Event, Watch, WatchKind};

#[tokio::test]
async fn break_sequence_reaches_the_wire_in_order() {
    let service = Service::bind_isolated(0).expect("bind");
    let mut stream = connect(&service).await;

    service.clear_hierarchy();
    service.editor_load_class("MyGame.PlayerController");
    service.editor_goto_line(42, 1);
    service.lock_list(0);
    assert_eq!(service.add_a_watch(0, -1, "i ( Int, 0x0 )", "5"), 1);
    service.unlock_list(0);
    service.call_stack_clear();
    service.call_stack_add("Function MyGame.PlayerController:Update");
    service.show_dll_form();

    assert_eq!(read_event(&mut stream).await, Event::ClearHierarchy);
    assert_eq!(
        read_event(&mut stream).await,
        Event::EditorLoadClass {
            class_name: "MyGame.PlayerController".into()
        }
    );
    assert_eq!(
        read_event(&mut stream).await,
        Event::EditorGotoLine {
            line: 42,
            highlight: true
        }
    );
    assert_eq!(
        read_event(&mut stream).await,
        Event::LockList {
            kind: WatchKind::Local
        }
    );
    assert_eq!(
        read_event(&mut stream).await,
        Event::UnlockList {
            kind: WatchKind::Local,
            watches: vec![Watch {
                parent: -1,
                index: 1,
                name: "i ( Int, 0x0 )".into(),
                value: "5".into(),
            }],
        }
    );
    assert_eq!(read_event(&mut stream).await, Event::CallStackClear);
    assert_eq!(
        read_event(&mut stream).await,
        Event::CallStackAdd {
            entry: "Function MyGame.PlayerController:Update".into()
        }
    );
    assert_eq!(read_event(&mut stream).await, Event::ShowDllForm);
}

#[tokio::test]
async fn watch_indices_are_monotonic_per_kind_and_reset_on_clear() {
    let service = Service::bind_isolated(0).expect("bind");
    let mut stream = connect(&service).await;

    service.lock_list(0);
    assert_eq!(service.add_a_watch(0, -1, "a ( Int, 0x0 )", "1"), 1);
    assert_eq!(service.add_a_watch(0, -1, "b ( Int, 0x0 )", "2"), 2);
    assert_eq!(service.add_a_watch(0, 1, "c ( Int, 0x0 )", "3"), 3);
    service.unlock_list(0);

    // The other kinds keep independent counters.
    service.lock_list(1);
    assert_eq!(service.add_a_watch(1, -1, "g ( Int, 0x0 )", "9"), 1);
    service.unlock_list(1);

    service.clear_a_watch(0);
    service.lock_list(0);
    assert_eq!(service.add_a_watch(0, -1, "a ( Int, 0x0 )", "1"), 1);
    service.unlock_list(0);

    // Drain and inspect the batches: every add between a lock/unlock pair
    // appears in that unlock, in call order.
    assert_eq!(
        read_event(&mut stream).await,
        Event::LockList {
            kind: WatchKind::Local
        }
    );
    let Event::UnlockList { kind, watches } = read_event(&mut stream).await else {
        panic!("expected unlock_list");
    };
    assert_eq!(kind, WatchKind::Local);
    assert_eq!(
        watches.iter().map(|w| w.index).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(watches[2].parent, 1);

    assert_eq!(
        read_event(&mut stream).await,
        Event::LockList {
            kind: WatchKind::Global
        }
    );
    let Event::UnlockList { kind, watches } = read_event(&mut stream).await else {
        panic!("expected unlock_list");
    };
    assert_eq!(kind, WatchKind::Global);
    assert_eq!(watches.len(), 1);
    assert_eq!(watches[0].index, 1);

    assert_eq!(
        read_event(&mut stream).await,
        Event::ClearAWatch {
            kind: WatchKind::Local
        }
    );
    assert_eq!(
        read_event(&mut stream).await,
        Event::LockList {
            kind: WatchKind::Local
        }
    );
    let Event::UnlockList { watches, .. } = read_event(&mut stream).await else {
        panic!("expected unlock_list");
    };
    assert_eq!(watches.len(), 1);
    assert_eq!(watches[0].index, 1);
}

#[tokio::test]
async fn toggling_watch_info_off_discards_pending_batches() {
    install_recorder();
    let service = Service::bind_isolated(0).expect("bind");
    let mut stream = connect(&service).await;

    // A lock is pending when the toggle arrives.
    service.lock_list(1);

    send_command(
        &mut stream,
        &Command::ToggleWatchInfo {
            send_watch_info: false,
        },
    )
    .await;
    // Commands are processed in order, so once the watch command behind the
    // toggle reaches the callback the toggle has been applied.
    send_command(
        &mut stream,
        &Command::AddWatch {
            var_name: "toggle_fence".into(),
        },
    )
    .await;
    wait_for_callback(|c| c == "addwatch toggle_fence").await;

    // Suppressed path: indices still advance, nothing reaches the wire.

    assert_eq!(service.add_a_watch(1, -1, "a ( Int, 0x0 )", "1"), 1);
    assert_eq!(service.add_a_watch(1, -1, "b ( Int, 0x0 )", "2"), 2);
    service.unlock_list(1);

    service.call_stack_clear();

    assert_eq!(
        read_event(&mut stream).await,
        Event::LockList {
            kind: WatchKind::Global
        }
    );
    // The suppressed unlock never arrives; the next event is the marker.
    assert_eq!(read_event(&mut stream).await, Event::CallStackClear);
}
