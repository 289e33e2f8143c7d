//! The DAP server loop.
//!
//! One reader task pulls requests off the transport and spawns a handler
//! task per request; a writer task serializes everything going the other
//! way through an unbounded channel. Handlers take the session mutex for
//! their whole run, which serializes probe round-trips against each other
//! while event dispatch (which never takes this lock) stays live.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use uscript_wire::{Command, WatchKind};

use crate::dap::{make_event, make_response, DapError, DapReader, DapWriter, Request};
use crate::debugger::{DebugNotification, UNREAL_THREAD_ID, UNREAL_THREAD_NAME};
use crate::session::{interface_addr, DebugSession};
use crate::sourcemap::SourceMap;
use crate::varref;

/// Run the adapter over stdio.
pub async fn run_stdio() -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    run(stdin, stdout).await.map_err(anyhow::Error::from)
}

#[derive(Clone)]
struct ServerContext {
    out_tx: mpsc::UnboundedSender<Value>,
    seq: Arc<AtomicI64>,
    session: Arc<Mutex<Option<DebugSession>>>,
    notifications: mpsc::UnboundedSender<DebugNotification>,
    shutdown: CancellationToken,
    terminated_sent: Arc<AtomicBool>,
}

impl ServerContext {
    fn next_seq(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn respond(&self, request: &Request, body: Option<Value>) {
        let seq = self.next_seq();
        let _ = self
            .out_tx
            .send(make_response(seq, request, true, body, None));
    }

    fn respond_error(&self, request: &Request, message: impl Into<String>) {
        let seq = self.next_seq();
        let _ = self
            .out_tx
            .send(make_response(seq, request, false, None, Some(message.into())));
    }

    fn emit_event(&self, event: &str, body: Option<Value>) {
        let seq = self.next_seq();
        let _ = self.out_tx.send(make_event(seq, event, body));
    }

    fn emit_terminated_once(&self) {
        if !self.terminated_sent.swap(true, Ordering::SeqCst) {
            self.emit_event("terminated", None);
        }
    }
}

pub async fn run<R, W>(reader: R, writer: W) -> Result<(), DapError>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let (notif_tx, mut notif_rx) = mpsc::unbounded_channel::<DebugNotification>();

    let ctx = ServerContext {
        out_tx,
        seq: Arc::new(AtomicI64::new(1)),
        session: Arc::new(Mutex::new(None)),
        notifications: notif_tx,
        shutdown: CancellationToken::new(),
        terminated_sent: Arc::new(AtomicBool::new(false)),
    };

    let writer_task = tokio::spawn(async move {
        let mut writer = DapWriter::new(writer);
        while let Some(message) = out_rx.recv().await {
            if let Err(err) = writer.write_value(&message).await {
                tracing::error!(target: "uscript.dap", %err, "DAP write failed");
                break;
            }
        }
    });

    // Debugger notifications become editor-facing events.
    let forward_task = tokio::spawn({
        let ctx = ctx.clone();
        async move {
            while let Some(notification) = notif_rx.recv().await {
                match notification {
                    DebugNotification::Stopped => ctx.emit_event(
                        "stopped",
                        Some(json!({
                            "reason": "breakpoint",
                            "threadId": UNREAL_THREAD_ID,
                            "allThreadsStopped": true,
                        })),
                    ),
                    DebugNotification::Output(text) => ctx.emit_event(
                        "output",
                        Some(json!({
                            "category": "console",
                            "output": format!("{text}\n"),
                        })),
                    ),
                    DebugNotification::Terminated => {
                        ctx.emit_terminated_once();
                        ctx.shutdown.cancel();
                    }
                }
            }
        }
    });

    let mut reader = DapReader::new(reader);
    let mut tasks = JoinSet::new();
    let result = loop {
        let has_tasks = !tasks.is_empty();
        tokio::select! {
            _ = ctx.shutdown.cancelled() => break Ok(()),
            Some(joined) = tasks.join_next(), if has_tasks => {
                let _ = joined;
            }
            read = reader.read_request() => {
                let request = match read {
                    Ok(Some(request)) => request,
                    Ok(None) => break Ok(()),
                    Err(err) => break Err(err),
                };
                if request.message_type != "request" {
                    continue;
                }

                let is_shutdown = matches!(request.command.as_str(), "disconnect" | "terminate");
                tasks.spawn(handle_request(ctx.clone(), request));
                if is_shutdown {
                    break Ok(());
                }
            }
        }
    };

    ctx.shutdown.cancel();
    while let Some(joined) = tasks.join_next().await {
        let _ = joined;
    }

    // Tear down the wire connection; the interface handles the rest.
    {
        let mut guard = ctx.session.lock().await;
        if let Some(session) = guard.take() {
            session.shutdown();
        }
    }

    // The forward task holds its own clone of the notification sender, so its
    // channel never closes on its own; everything it had to say has been said
    // by the time the request loop is done.
    forward_task.abort();
    let _ = forward_task.await;

    drop(ctx);
    let _ = writer_task.await;
    result
}

async fn handle_request(ctx: ServerContext, request: Request) {
    tracing::debug!(target: "uscript.dap", command = %request.command, seq = request.seq, "handling request");
    match request.command.as_str() {
        "initialize" => initialize(&ctx, &request),
        "launch" | "attach" => launch(&ctx, &request).await,
        "configurationDone" => ctx.respond(&request, None),
        "setBreakpoints" => set_breakpoints(&ctx, &request).await,
        "threads" => threads(&ctx, &request),
        "stackTrace" => stack_trace(&ctx, &request).await,
        "scopes" => scopes(&ctx, &request).await,
        "variables" => variables(&ctx, &request).await,
        "evaluate" => evaluate(&ctx, &request).await,
        "pause" | "continue" | "next" | "stepIn" | "stepOut" => {
            execution_control(&ctx, &request).await
        }
        "disconnect" | "terminate" => disconnect(&ctx, &request).await,
        other => ctx.respond_error(&request, format!("Unknown command: {other}")),
    }
}

fn initialize(ctx: &ServerContext, request: &Request) {
    let capabilities = json!({
        "supportsConfigurationDoneRequest": true,
        "supportsDelayedStackTraceLoading": true,
        "supportsValueFormattingOptions": true,
    });
    ctx.respond(request, Some(capabilities));
    ctx.emit_event("initialized", None);
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LaunchArguments {
    #[serde(default)]
    source_roots: Vec<String>,
    #[serde(default)]
    port: Option<u16>,
}

async fn launch(ctx: &ServerContext, request: &Request) {
    let args: LaunchArguments = match serde_json::from_value(request.arguments.clone()) {
        Ok(args) => args,
        Err(err) => return ctx.respond_error(request, format!("bad launch arguments: {err}")),
    };

    let roots: Vec<PathBuf> = args.source_roots.iter().map(PathBuf::from).collect();
    let source_map = match SourceMap::new(roots) {
        Ok(map) => map,
        Err(err) => return ctx.respond_error(request, err.to_string()),
    };

    let addr = interface_addr(args.port);
    let session = match DebugSession::connect(addr, source_map, ctx.notifications.clone()).await {
        Ok(session) => session,
        Err(err) => {
            return ctx.respond_error(
                request,
                format!("could not connect to the debugger interface at {addr}: {err}"),
            )
        }
    };

    *ctx.session.lock().await = Some(session);
    ctx.respond(request, None);
}

async fn set_breakpoints(ctx: &ServerContext, request: &Request) {
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Source {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        source_reference: Option<i64>,
    }

    #[derive(Debug, Deserialize)]
    struct SourceBreakpoint {
        line: i32,
    }

    #[derive(Debug, Deserialize)]
    struct Args {
        source: Source,
        #[serde(default)]
        breakpoints: Vec<SourceBreakpoint>,
    }

    let args: Args = match serde_json::from_value(request.arguments.clone()) {
        Ok(args) => args,
        Err(err) => {
            return ctx.respond_error(request, format!("bad setBreakpoints arguments: {err}"))
        }
    };

    if args.source.source_reference.is_some_and(|r| r != 0) {
        return ctx.respond_error(request, "source references are not supported");
    }
    let Some(path) = args.source.path else {
        return ctx.respond_error(request, "setBreakpoints requires a source path");
    };

    let class_name = match SourceMap::source_to_class(&path) {
        Ok(class_name) => class_name,
        Err(err) => return ctx.respond_error(request, err.to_string()),
    };

    let guard = ctx.session.lock().await;
    let Some(session) = guard.as_ref() else {
        return ctx.respond_error(request, "no active debug session");
    };

    let lines: Vec<i32> = args.breakpoints.iter().map(|bp| bp.line).collect();
    match session.set_breakpoints(&class_name, &lines).await {
        Ok(results) => {
            let breakpoints: Vec<Value> = results
                .into_iter()
                .map(|(line, verified)| json!({ "verified": verified, "line": line }))
                .collect();
            ctx.respond(request, Some(json!({ "breakpoints": breakpoints })));
        }
        Err(err) => ctx.respond_error(request, err.to_string()),
    }
}

fn threads(ctx: &ServerContext, request: &Request) {
    ctx.respond(
        request,
        Some(json!({
            "threads": [{ "id": UNREAL_THREAD_ID, "name": UNREAL_THREAD_NAME }]
        })),
    );
}

async fn stack_trace(ctx: &ServerContext, request: &Request) {
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        thread_id: i64,
        #[serde(default)]
        start_frame: Option<i64>,
        #[serde(default)]
        levels: Option<i64>,
    }

    let args: Args = match serde_json::from_value(request.arguments.clone()) {
        Ok(args) => args,
        Err(err) => return ctx.respond_error(request, format!("bad stackTrace arguments: {err}")),
    };

    if args.thread_id != UNREAL_THREAD_ID {
        return ctx.respond_error(request, format!("Unknown thread id: {}", args.thread_id));
    }
    if args.start_frame.is_some_and(|start| start < 0) {
        return ctx.respond_error(request, "stackTrace.startFrame must be >= 0");
    }
    if args.levels.is_some_and(|levels| levels < 0) {
        return ctx.respond_error(request, "stackTrace.levels must be >= 0");
    }

    let guard = ctx.session.lock().await;
    let Some(session) = guard.as_ref() else {
        return ctx.respond_error(request, "no active debug session");
    };

    let start = args.start_frame.unwrap_or(0) as usize;
    // levels == 0 means "all remaining frames" in DAP.
    let levels = args.levels.and_then(|levels| match levels {
        0 => None,
        levels => usize::try_from(levels).ok(),
    });

    match session.stack_trace(start, levels).await {
        Ok((frames, total)) => {
            let stack_frames: Vec<Value> = frames
                .iter()
                .map(|frame| {
                    let path = session.source_map().class_to_source(&frame.class_name);
                    let mut source = json!({ "name": frame.class_name });
                    if let Some(path) = path {
                        source["path"] = Value::String(path.display().to_string());
                    }
                    json!({
                        "id": frame.index,
                        "name": frame.function_name,
                        "source": source,
                        "line": frame.line,
                        "column": 0,
                    })
                })
                .collect();
            ctx.respond(
                request,
                Some(json!({ "stackFrames": stack_frames, "totalFrames": total })),
            );
        }
        Err(err) => ctx.respond_error(request, err.to_string()),
    }
}

async fn scopes(ctx: &ServerContext, request: &Request) {
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        frame_id: i64,
    }

    let args: Args = match serde_json::from_value(request.arguments.clone()) {
        Ok(args) => args,
        Err(err) => return ctx.respond_error(request, format!("bad scopes arguments: {err}")),
    };

    let Ok(frame) = usize::try_from(args.frame_id) else {
        return ctx.respond_error(request, format!("Unknown frame id: {}", args.frame_id));
    };

    let guard = ctx.session.lock().await;
    let Some(session) = guard.as_ref() else {
        return ctx.respond_error(request, "no active debug session");
    };

    if let Err(err) = session.ensure_frame_watches(frame).await {
        return ctx.respond_error(request, err.to_string());
    }

    let locals = varref::encode(frame, 0, WatchKind::Local);
    let globals = varref::encode(frame, 0, WatchKind::Global);
    match (locals, globals) {
        (Ok(locals), Ok(globals)) => ctx.respond(
            request,
            Some(json!({
                "scopes": [
                    {
                        "name": "Locals",
                        "presentationHint": "locals",
                        "variablesReference": locals,
                        "expensive": false,
                    },
                    {
                        "name": "Globals",
                        "variablesReference": globals,
                        "expensive": false,
                    },
                ]
            })),
        ),
        (Err(err), _) | (_, Err(err)) => ctx.respond_error(request, err.to_string()),
    }
}

async fn variables(ctx: &ServerContext, request: &Request) {
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        variables_reference: i64,
        #[serde(default)]
        start: Option<i64>,
        #[serde(default)]
        count: Option<i64>,
    }

    let args: Args = match serde_json::from_value(request.arguments.clone()) {
        Ok(args) => args,
        Err(err) => return ctx.respond_error(request, format!("bad variables arguments: {err}")),
    };

    if args.start.unwrap_or(0) != 0 || args.count.unwrap_or(0) != 0 {
        return ctx.respond_error(request, "chunked variable requests are not supported");
    }

    let (frame, node, kind) = match varref::decode(args.variables_reference) {
        Ok(decoded) => decoded,
        Err(err) => return ctx.respond_error(request, err.to_string()),
    };

    let guard = ctx.session.lock().await;
    let Some(session) = guard.as_ref() else {
        return ctx.respond_error(request, "no active debug session");
    };

    if let Err(err) = session.ensure_frame_watches(frame).await {
        return ctx.respond_error(request, err.to_string());
    }

    match session.variable_children(frame, node, kind) {
        Ok(children) => {
            let variables: Result<Vec<Value>, _> = children
                .iter()
                .map(|child| {
                    let reference = if child.has_children {
                        varref::encode(frame, child.index, kind)?
                    } else {
                        0
                    };
                    Ok::<Value, varref::VarRefError>(json!({
                        "name": child.name,
                        "type": child.type_name,
                        "value": child.value,
                        "variablesReference": reference,
                    }))
                })
                .collect();
            match variables {
                Ok(variables) => ctx.respond(request, Some(json!({ "variables": variables }))),
                Err(err) => ctx.respond_error(request, err.to_string()),
            }
        }
        Err(err) => ctx.respond_error(request, err.to_string()),
    }
}

async fn evaluate(ctx: &ServerContext, request: &Request) {
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        expression: String,
        #[serde(default)]
        frame_id: Option<i64>,
        #[serde(default)]
        context: Option<String>,
    }

    let args: Args = match serde_json::from_value(request.arguments.clone()) {
        Ok(args) => args,
        Err(err) => return ctx.respond_error(request, format!("bad evaluate arguments: {err}")),
    };

    if args.context.as_deref().is_some_and(|c| c != "watch") {
        return ctx.respond(
            request,
            Some(json!({ "result": "Unsupported expression", "variablesReference": 0 })),
        );
    }

    let Some(frame) = args.frame_id.and_then(|id| usize::try_from(id).ok()) else {
        return ctx.respond(
            request,
            Some(json!({ "result": "Evaluation requires a frameId", "variablesReference": 0 })),
        );
    };

    let guard = ctx.session.lock().await;
    let Some(session) = guard.as_ref() else {
        return ctx.respond_error(request, "no active debug session");
    };

    match session.evaluate_watch(frame, &args.expression).await {
        Ok(Some(hit)) => {
            let reference = if hit.has_children {
                match varref::encode(frame, hit.index, WatchKind::User) {
                    Ok(reference) => reference,
                    Err(err) => return ctx.respond_error(request, err.to_string()),
                }
            } else {
                0
            };
            ctx.respond(
                request,
                Some(json!({
                    "result": hit.value,
                    "type": hit.type_name,
                    "variablesReference": reference,
                })),
            );
        }
        Ok(None) => ctx.respond(
            request,
            Some(json!({ "result": "Invalid watch", "variablesReference": 0 })),
        ),
        Err(err) => ctx.respond_error(request, err.to_string()),
    }
}

async fn execution_control(ctx: &ServerContext, request: &Request) {
    let command = match request.command.as_str() {
        "pause" => Command::Break,
        "continue" => Command::Go,
        "next" => Command::StepOver,
        "stepIn" => Command::StepInto,
        "stepOut" => Command::StepOutOf,
        _ => unreachable!("routed by handle_request"),
    };

    let guard = ctx.session.lock().await;
    let Some(session) = guard.as_ref() else {
        return ctx.respond_error(request, "no active debug session");
    };

    session.execution_control(command);

    let body = match request.command.as_str() {
        "continue" => Some(json!({ "allThreadsContinued": true })),
        _ => None,
    };
    ctx.respond(request, body);
}

async fn disconnect(ctx: &ServerContext, request: &Request) {
    {
        let guard = ctx.session.lock().await;
        if let Some(session) = guard.as_ref() {
            session.disconnect();
        }
    }
    ctx.respond(request, None);
    ctx.emit_terminated_once();
}
