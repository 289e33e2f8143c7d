use super::util::{connect, install_recorder, recorded, send_command, wait_for_callback};

use uscript_interface::{Service, ServiceState};
use uscript_wire::Command;

#[tokio::test]
async fn commands_become_unreal_callback_strings() {
    install_recorder();
    let service = Service::bind_isolated(0).expect("bind");
    let mut stream = connect(&service).await;

    let commands = [
        (
            Command::AddBreakpoint {
                class_name: "XGame.XPawn".into(),
                line: 10,
            },
            "addbreakpoint XGame.XPawn 10",
        ),
        (
            Command::RemoveBreakpoint {
                class_name: "XGame.XPawn".into(),
                line: 10,
            },
            "removebreakpoint XGame.XPawn 10",
        ),
        (
            Command::AddWatch {
                var_name: "dispatch_probe".into(),
            },
            "addwatch dispatch_probe",
        ),
        (
            Command::RemoveWatch {
                var_name: "dispatch_probe".into(),
            },
            "removewatch dispatch_probe",
        ),
        (Command::ClearWatch, "clearwatch"),
        (Command::ChangeStack { stack_id: 2 }, "changestack 2"),
        (
            Command::SetDataWatch {
                var_name: "dispatch_data".into(),
            },
            "setdatawatch dispatch_data",
        ),
        (Command::BreakOnNone { value: true }, "breakonnone 1"),
        (Command::BreakOnNone { value: false }, "breakonnone 0"),
        (Command::Break, "break"),
        (Command::Go, "go"),
        (Command::StepInto, "stepinto"),
        (Command::StepOver, "stepover"),
        (Command::StepOutOf, "stepoutof"),
    ];

    for (command, _) in &commands {
        send_command(&mut stream, command).await;
    }
    wait_for_callback(|c| c == "stepoutof").await;

    let all = recorded();
    let expected: Vec<&str> = commands.iter().map(|(_, s)| *s).collect();
    // Other tests share the recorder; check that our strings appear as an
    // in-order subsequence.
    let mut iter = all.iter();
    for want in &expected {
        assert!(
            iter.any(|got| got.as_str() == *want),
            "missing or out of order: {want}, recorded: {all:?}"
        );
    }
}

#[tokio::test]
async fn stop_debugging_marks_shutdown_before_the_callback() {
    install_recorder();
    let service = Service::bind_isolated(0).expect("bind");
    let mut stream = connect(&service).await;

    send_command(&mut stream, &Command::StopDebugging).await;
    wait_for_callback(|c| c == "stopdebugging").await;

    assert_eq!(service.state(), ServiceState::Shutdown);
}
