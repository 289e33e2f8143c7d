//! Full bridge scenarios: a scripted DAP client on one side, the fake
//! interface standing in for the game on the other.

use std::collections::HashMap;
use std::fs;

use serde_json::json;
use tempfile::TempDir;

use uscript_dap::varref;
use uscript_wire::{Command, Event, WatchKind};

use super::dap_client::TestClient;
use super::fake_interface::{Behavior, FakeInterface, FrameData};

fn source_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let classes = temp.path().join("MyGame").join("Classes");
    fs::create_dir_all(&classes).unwrap();
    for class in ["Foo", "Bar"] {
        fs::write(classes.join(format!("{class}.uc")), format!("class {class};")).unwrap();
    }
    temp
}

fn behavior() -> Behavior {
    let mut frames = HashMap::new();
    frames.insert(
        0,
        FrameData {
            class_name: "MyGame.Foo".into(),
            line: 10,
            locals: vec![
                (-1, 1, "pawn ( Object, 0x1 )".into(), "XPawn_0".into()),
                (1, 2, "Health ( Int, 0x2 )".into(), "100".into()),
            ],
            globals: vec![(-1, 1, "Owner ( Object, 0x4 )".into(), "Pawn_0".into())],
        },
    );
    frames.insert(
        1,
        FrameData {
            class_name: "MyGame.Bar".into(),
            line: 77,
            locals: vec![(-1, 1, "j ( Float, 0x8 )".into(), "2.5".into())],
            globals: vec![],
        },
    );

    let mut user_watches = HashMap::new();
    user_watches.insert(
        "player.Health".to_string(),
        (
            "player.Health ( ObjectProperty, 0x10 )".to_string(),
            "100".to_string(),
        ),
    );

    Behavior {
        frames,
        user_watches,
    }
}

/// The fake commands arrive in FIFO order; assert `expected` appears as an
/// in-order subsequence.
fn assert_command_subsequence(all: &[Command], expected: &[Command]) {
    let mut iter = all.iter();
    for want in expected {
        assert!(
            iter.any(|got| got == want),
            "missing or out of order: {want:?}\nall commands: {all:?}"
        );
    }
}

#[tokio::test]
async fn break_stack_variables_and_evaluate() {
    let temp = source_tree();
    let fake = FakeInterface::start(behavior()).await;
    let mut client = TestClient::start();

    client.expect_success("initialize", json!({})).await;
    client.wait_event("initialized").await;
    client
        .expect_success(
            "launch",
            json!({ "sourceRoots": [temp.path()], "port": fake.port() }),
        )
        .await;

    // The game breaks in Foo.InnerFn, called from Bar.OuterFn.
    fake.emit_break(&[(1, "OuterFn"), (0, "InnerFn")]);
    let stopped = client.wait_event("stopped").await;
    assert_eq!(stopped["body"]["reason"], "breakpoint");
    assert_eq!(stopped["body"]["threadId"], 1);

    // Stack trace: frame 1's line is unknown and gets probed with watch
    // traffic turned off.
    let body = client
        .expect_success("stackTrace", json!({ "threadId": 1 }))
        .await;
    assert_eq!(body["totalFrames"], 2);
    let frames = body["stackFrames"].as_array().unwrap();
    assert_eq!(frames.len(), 2);

    assert_eq!(frames[0]["id"], 0);
    assert_eq!(frames[0]["name"], "InnerFn");
    assert_eq!(frames[0]["line"], 10);
    assert_eq!(frames[0]["source"]["name"], "MyGame.Foo");
    let path = frames[0]["source"]["path"].as_str().unwrap();
    assert!(path.ends_with("Foo.uc"), "got path {path}");

    assert_eq!(frames[1]["id"], 1);
    assert_eq!(frames[1]["name"], "OuterFn");
    assert_eq!(frames[1]["line"], 77);

    assert_command_subsequence(
        &fake.commands(),
        &[
            Command::ToggleWatchInfo {
                send_watch_info: false,
            },
            Command::ChangeStack { stack_id: 1 },
            Command::ChangeStack { stack_id: 0 },
            Command::ToggleWatchInfo {
                send_watch_info: true,
            },
        ],
    );

    // Scopes and variables on the already-populated top frame.
    let locals_ref = varref::encode(0, 0, WatchKind::Local).unwrap();
    let globals_ref = varref::encode(0, 0, WatchKind::Global).unwrap();
    let body = client
        .expect_success("scopes", json!({ "frameId": 0 }))
        .await;
    assert_eq!(
        body["scopes"],
        json!([
            {
                "name": "Locals",
                "presentationHint": "locals",
                "variablesReference": locals_ref,
                "expensive": false,
            },
            {
                "name": "Globals",
                "variablesReference": globals_ref,
                "expensive": false,
            },
        ])
    );

    let body = client
        .expect_success("variables", json!({ "variablesReference": locals_ref }))
        .await;
    let variables = body["variables"].as_array().unwrap();
    assert_eq!(variables.len(), 1);
    assert_eq!(variables[0]["name"], "pawn");
    assert_eq!(variables[0]["type"], "Object");
    assert_eq!(variables[0]["value"], "XPawn_0");
    let pawn_ref = variables[0]["variablesReference"].as_i64().unwrap();
    assert_ne!(pawn_ref, 0, "pawn has children");

    let body = client
        .expect_success("variables", json!({ "variablesReference": pawn_ref }))
        .await;
    assert_eq!(
        body["variables"],
        json!([{ "name": "Health", "type": "Int", "value": "100", "variablesReference": 0 }])
    );

    // Scopes on the outer frame force a watch fetch through change_stack.
    let body = client
        .expect_success("scopes", json!({ "frameId": 1 }))
        .await;
    let frame1_locals = body["scopes"][0]["variablesReference"].clone();
    let body = client
        .expect_success("variables", json!({ "variablesReference": frame1_locals }))
        .await;
    assert_eq!(
        body["variables"],
        json!([{ "name": "j", "type": "Float", "value": "2.5", "variablesReference": 0 }])
    );

    // Evaluate is only supported for watch expressions.
    let body = client
        .expect_success(
            "evaluate",
            json!({ "expression": "player.Health", "frameId": 0, "context": "hover" }),
        )
        .await;
    assert_eq!(body["result"], "Unsupported expression");

    // A fresh watch expression goes through add_watch and comes back typed.
    let body = client
        .expect_success(
            "evaluate",
            json!({ "expression": "player.Health", "frameId": 0, "context": "watch" }),
        )
        .await;
    assert_eq!(body["result"], "100");
    assert_eq!(body["type"], "ObjectProperty");
    assert_eq!(body["variablesReference"], 0);
    assert_command_subsequence(
        &fake.commands(),
        &[Command::AddWatch {
            var_name: "player.Health".into(),
        }],
    );

    // An expression Unreal cannot evaluate is a soft failure.
    let body = client
        .expect_success(
            "evaluate",
            json!({ "expression": "bogus.expr", "frameId": 0, "context": "watch" }),
        )
        .await;
    assert_eq!(body["result"], "Invalid watch");
    assert_eq!(body["variablesReference"], 0);

    client.request("disconnect", json!({})).await;
    client.wait_event("terminated").await;
    client.finish().await.expect("clean server exit");
}

#[tokio::test]
async fn breakpoints_are_confirmed_and_replaced() {
    let temp = source_tree();
    let fake = FakeInterface::start(behavior()).await;
    let mut client = TestClient::start();

    client.expect_success("initialize", json!({})).await;
    client
        .expect_success(
            "launch",
            json!({ "sourceRoots": [temp.path()], "port": fake.port() }),
        )
        .await;

    let foo_path = temp
        .path()
        .join("MyGame")
        .join("Classes")
        .join("Foo.uc")
        .display()
        .to_string();

    let body = client
        .expect_success(
            "setBreakpoints",
            json!({
                "source": { "path": foo_path },
                "breakpoints": [{ "line": 10 }, { "line": 20 }],
            }),
        )
        .await;
    assert_eq!(
        body["breakpoints"],
        json!([
            { "verified": true, "line": 10 },
            { "verified": true, "line": 20 },
        ])
    );

    // Re-sending for the same source replaces: the old lines are removed
    // before the new one is added.
    let body = client
        .expect_success(
            "setBreakpoints",
            json!({
                "source": { "path": foo_path },
                "breakpoints": [{ "line": 30 }],
            }),
        )
        .await;
    assert_eq!(body["breakpoints"], json!([{ "verified": true, "line": 30 }]));

    assert_command_subsequence(
        &fake.commands(),
        &[
            Command::AddBreakpoint {
                class_name: "MyGame.Foo".into(),
                line: 10,
            },
            Command::AddBreakpoint {
                class_name: "MyGame.Foo".into(),
                line: 20,
            },
            Command::RemoveBreakpoint {
                class_name: "MyGame.Foo".into(),
                line: 10,
            },
            Command::RemoveBreakpoint {
                class_name: "MyGame.Foo".into(),
                line: 20,
            },
            Command::AddBreakpoint {
                class_name: "MyGame.Foo".into(),
                line: 30,
            },
        ],
    );

    client.request("disconnect", json!({})).await;
    client.finish().await.expect("clean server exit");
}

#[tokio::test]
async fn execution_control_resumes_and_rebreaks() {
    let temp = source_tree();
    let fake = FakeInterface::start(behavior()).await;
    let mut client = TestClient::start();

    client.expect_success("initialize", json!({})).await;
    client
        .expect_success(
            "launch",
            json!({ "sourceRoots": [temp.path()], "port": fake.port() }),
        )
        .await;

    fake.emit_break(&[(0, "InnerFn")]);
    client.wait_event("stopped").await;

    let body = client
        .expect_success("continue", json!({ "threadId": 1 }))
        .await;
    assert_eq!(body["allThreadsContinued"], true);
    fake.wait_for_command(|c| *c == Command::Go).await;

    // The next break rebuilds the stack from scratch.
    fake.emit_break(&[(1, "OuterFn")]);
    client.wait_event("stopped").await;

    let body = client
        .expect_success("stackTrace", json!({ "threadId": 1 }))
        .await;
    assert_eq!(body["totalFrames"], 1);
    assert_eq!(body["stackFrames"][0]["name"], "OuterFn");
    assert_eq!(body["stackFrames"][0]["line"], 77);
    assert_eq!(body["stackFrames"][0]["source"]["name"], "MyGame.Bar");

    for (command, wire) in [
        ("next", Command::StepOver),
        ("stepIn", Command::StepInto),
        ("stepOut", Command::StepOutOf),
        ("pause", Command::Break),
    ] {
        client
            .expect_success(command, json!({ "threadId": 1 }))
            .await;
        fake.wait_for_command(move |c| *c == wire).await;
    }

    client.request("disconnect", json!({})).await;
    client.finish().await.expect("clean server exit");
}

#[tokio::test]
async fn game_log_and_interface_termination_flow_through() {
    let temp = TempDir::new().unwrap();
    let fake = FakeInterface::start(Behavior::default()).await;
    let mut client = TestClient::start();

    client.expect_success("initialize", json!({})).await;
    client
        .expect_success(
            "launch",
            json!({ "sourceRoots": [temp.path()], "port": fake.port() }),
        )
        .await;

    fake.emit(Event::AddLineToLog {
        text: "Log: ScriptLog: hello".into(),
    });
    let output = client.wait_event("output").await;
    assert_eq!(output["body"]["category"], "console");
    assert_eq!(output["body"]["output"], "Log: ScriptLog: hello\n");

    // The interface announcing termination ends the adapter cleanly.
    fake.emit(Event::Terminated);
    client.wait_event("terminated").await;
    client.finish().await.expect("clean server exit");
}
