use std::collections::HashMap;
use std::sync::mpsc;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use robo_core::bindings::Role;
use robo_core::viewer::parse_speed;
use robo_core::{Viewer, ViewerError};

use crate::input::InputState;

/// A command request received via the Unix socket.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandRequest {
    pub cmd: String,
    #[serde(flatten)]
    pub params: HashMap<String, Value>,
}

/// A command response sent back via the socket.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(data: Value) -> Self {
        Self { status: "ok".into(), data: Some(data), message: None }
    }
    pub fn ok_empty() -> Self {
        Self { status: "ok".into(), data: None, message: None }
    }
    pub fn error(msg: impl Into<String>) -> Self {
        Self { status: "error".into(), data: None, message: Some(msg.into()) }
    }
}

impl From<ViewerError> for CommandResponse {
    fn from(e: ViewerError) -> Self {
        CommandResponse::error(e.to_string())
    }
}

/// A pending command awaiting processing on the main thread.
pub struct PendingCommand {
    pub request: CommandRequest,
    pub responder: mpsc::Sender<CommandResponse>,
}

/// Command socket server. Runs a tokio runtime on a background thread,
/// accepts connections on a Unix domain socket, and forwards commands
/// to the main thread via a channel.
pub struct CommandServer {
    cmd_rx: mpsc::Receiver<PendingCommand>,
    pub socket_path: String,
}

impl CommandServer {
    pub fn start(socket_path: &str) -> Result<Self, String> {
        let _ = std::fs::remove_file(socket_path);

        let (cmd_tx, cmd_rx) = mpsc::channel();
        let path = socket_path.to_string();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime for command server: {}", e))?;

        std::thread::Builder::new()
            .name("command-socket".into())
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match tokio::net::UnixListener::bind(&path) {
                        Ok(l) => l,
                        Err(e) => {
                            tracing::error!("Failed to bind command socket at {}: {}", path, e);
                            return;
                        }
                    };
                    tracing::info!("Command socket listening on {}", path);

                    loop {
                        match listener.accept().await {
                            Ok((stream, _addr)) => {
                                let tx = cmd_tx.clone();
                                tokio::spawn(handle_connection(stream, tx));
                            }
                            Err(e) => {
                                tracing::warn!("Command socket accept error: {}", e);
                            }
                        }
                    }
                });
            })
            .map_err(|e| format!("Failed to spawn command socket thread: {}", e))?;

        Ok(Self { cmd_rx, socket_path: socket_path.to_string() })
    }

    /// Poll for pending commands (non-blocking).
    pub fn poll(&self) -> Vec<PendingCommand> {
        self.cmd_rx.try_iter().collect()
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn write_response(writer: &mut tokio::net::unix::OwnedWriteHalf, response: &CommandResponse) {
    use tokio::io::AsyncWriteExt;

    let j = serde_json::to_string(response).unwrap_or_default();
    let _ = writer.write_all(format!("{}\n", j).as_bytes()).await;
}

async fn handle_connection(
    stream: tokio::net::UnixStream,
    cmd_tx: mpsc::Sender<PendingCommand>,
) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: CommandRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                write_response(&mut writer, &CommandResponse::error(format!("Invalid JSON: {}", e))).await;
                continue;
            }
        };

        let (resp_tx, resp_rx) = mpsc::channel();
        let pending = PendingCommand { request, responder: resp_tx };

        if cmd_tx.send(pending).is_err() {
            write_response(&mut writer, &CommandResponse::error("Viewer shut down")).await;
            break;
        }

        // The frame loop answers within one frame; block this connection only.
        let response = tokio::task::spawn_blocking(move || {
            resp_rx
                .recv_timeout(std::time::Duration::from_secs(5))
                .unwrap_or_else(|_| CommandResponse::error("Command timed out"))
        })
        .await
        .unwrap_or_else(|_| CommandResponse::error("Command worker failed"));
        write_response(&mut writer, &response).await;
    }
}

// ---------------------------------------------------------------------------
// Command dispatch + handlers
// ---------------------------------------------------------------------------

/// Dispatch a command to the appropriate handler.
pub fn handle_command(req: &CommandRequest, viewer: &mut Viewer, input: &mut InputState) -> CommandResponse {
    match req.cmd.as_str() {
        "list_parts" => cmd_list_parts(viewer),
        "assign_part" => cmd_assign_part(req, viewer),
        "unassign_part" => cmd_unassign_part(req, viewer),
        "reset_parts" => {
            viewer.reset_parts();
            CommandResponse::ok_empty()
        }
        "set_speed" => cmd_set_speed(req, viewer),
        "test_walk" => {
            viewer.test_walk();
            CommandResponse::ok_empty()
        }
        "test_jump" => cmd_test_jump(viewer),
        "reset_position" => {
            viewer.reset_position();
            CommandResponse::ok_empty()
        }
        "get_state" => to_response(&viewer.state()),
        "panel" => to_response(&viewer.panel_view()),
        "toggle_panel" => CommandResponse::ok(json!({"expanded": viewer.panel.toggle_panel()})),
        "toggle_category" => cmd_toggle_category(req, viewer),
        "query_events" => cmd_query_events(req, viewer),
        "inject_input" => cmd_inject_input(req, input),
        _ => CommandResponse::error(format!("Unknown command: {}", req.cmd)),
    }
}

fn to_response<T: Serialize>(value: &T) -> CommandResponse {
    match serde_json::to_value(value) {
        Ok(v) => CommandResponse::ok(v),
        Err(e) => CommandResponse::error(format!("Serialization failed: {}", e)),
    }
}

fn get_str_param<'a>(req: &'a CommandRequest, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

fn get_f32_param(req: &CommandRequest, key: &str) -> Option<f32> {
    req.params.get(key).and_then(|v| v.as_f64()).map(|v| v as f32)
}

fn get_role(req: &CommandRequest) -> Result<Role, CommandResponse> {
    let name = get_str_param(req, "role").ok_or_else(|| CommandResponse::error("Missing 'role' parameter"))?;
    Role::parse(name).map_err(|e| CommandResponse::error(e.to_string()))
}

fn cmd_list_parts(viewer: &Viewer) -> CommandResponse {
    let parts: Vec<Value> = viewer
        .parts()
        .iter()
        .map(|p| {
            let roles: Vec<&str> = Role::ALL
                .iter()
                .filter(|r| viewer.bindings().is_bound_to(**r, p.node))
                .map(|r| r.as_str())
                .collect();
            json!({"index": p.index, "name": p.name, "roles": roles})
        })
        .collect();
    CommandResponse::ok(json!({"parts": parts, "count": parts.len()}))
}

fn cmd_assign_part(req: &CommandRequest, viewer: &mut Viewer) -> CommandResponse {
    let role = match get_role(req) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let index = match req.params.get("index").and_then(|v| v.as_u64()) {
        Some(i) => i as usize,
        None => return CommandResponse::error("Missing 'index' parameter"),
    };
    match viewer.assign_part(role, index) {
        Ok(name) => CommandResponse::ok(json!({"role": role.as_str(), "index": index, "name": name})),
        Err(e) => e.into(),
    }
}

fn cmd_unassign_part(req: &CommandRequest, viewer: &mut Viewer) -> CommandResponse {
    match get_role(req) {
        Ok(role) => CommandResponse::ok(json!({"role": role.as_str(), "previous": viewer.unassign_part(role)})),
        Err(resp) => resp,
    }
}

/// Accepts `"value": 1.5` or `"value": "1.5"`.
fn cmd_set_speed(req: &CommandRequest, viewer: &mut Viewer) -> CommandResponse {
    let parsed = match req.params.get("value") {
        Some(Value::String(s)) => parse_speed(s),
        Some(v) => v
            .as_f64()
            .map(|f| f as f32)
            .ok_or_else(|| ViewerError::InvalidSpeed(v.to_string())),
        None => return CommandResponse::error("Missing 'value' parameter"),
    };
    match parsed.and_then(|value| viewer.set_speed(value)) {
        Ok(()) => CommandResponse::ok(json!({"speed": robo_core::panel::speed_label(viewer.speed_multiplier())})),
        Err(e) => {
            tracing::warn!("Rejected speed change: {}", e);
            e.into()
        }
    }
}

fn cmd_test_jump(viewer: &mut Viewer) -> CommandResponse {
    if viewer.character().is_none() {
        return ViewerError::NoModel.into();
    }
    CommandResponse::ok(json!({"started": viewer.test_jump()}))
}

fn cmd_toggle_category(req: &CommandRequest, viewer: &mut Viewer) -> CommandResponse {
    match get_role(req) {
        Ok(role) => CommandResponse::ok(json!({
            "role": role.as_str(),
            "collapsed": viewer.panel.toggle_category(role),
        })),
        Err(resp) => resp,
    }
}

fn cmd_query_events(req: &CommandRequest, viewer: &Viewer) -> CommandResponse {
    let filter = get_str_param(req, "filter");
    let since = req.params.get("since_frame").and_then(|v| v.as_u64());
    let limit = req.params.get("limit")
        .and_then(|v| v.as_u64()).map(|v| v as usize).unwrap_or(100);

    let events: Vec<Value> = viewer
        .events
        .query(filter, since)
        .into_iter()
        .rev()
        .take(limit)
        .map(|e| json!({
            "event_type": e.event_type,
            "data": e.data,
            "frame": e.frame,
        }))
        .collect();
    CommandResponse::ok(json!({"events": events, "count": events.len()}))
}

fn cmd_inject_input(req: &CommandRequest, input: &mut InputState) -> CommandResponse {
    let action = match get_str_param(req, "action") {
        Some(a) => a,
        None => return CommandResponse::error("Missing 'action' parameter"),
    };
    match action {
        "key_press" | "key_release" => {
            let key = match get_str_param(req, "key") {
                Some(k) => k,
                None => return CommandResponse::error("Missing 'key' parameter"),
            };
            let known = if action == "key_press" {
                input.inject_key_press(key)
            } else {
                input.inject_key_release(key)
            };
            if !known {
                return CommandResponse::error(format!("Unknown key: {}", key));
            }
        }
        "joystick" => {
            let vector = match (get_f32_param(req, "x"), get_f32_param(req, "y")) {
                (Some(x), Some(y)) => Some(Vec2::new(x, y)),
                _ => None,
            };
            input.inject_joystick(vector);
        }
        "jump_button" => {
            let held = req.params.get("held").and_then(|v| v.as_bool()).unwrap_or(true);
            input.inject_jump_button(held);
        }
        other => return CommandResponse::error(format!("Unknown input action: {}", other)),
    }
    CommandResponse::ok_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use robo_core::model::{Bounds, ModelAsset, NodeDesc};
    use robo_core::ControllerConfig;

    use crate::input::InputBindings;

    fn request(json: Value) -> CommandRequest {
        serde_json::from_value(json).unwrap()
    }

    fn setup() -> (Viewer, InputState) {
        let mut viewer = Viewer::new(ControllerConfig::default());
        viewer.load_character(&ModelAsset {
            source: "bot.glb".into(),
            root: NodeDesc::group(
                Some("Scene".into()),
                vec![NodeDesc::group(Some("LegL".into()), vec![]), NodeDesc::group(None, vec![])],
            ),
            bounds: Some(Bounds { min: glam::Vec3::ZERO, max: glam::Vec3::ONE }),
        });
        (viewer, InputState::new(InputBindings::default()))
    }

    fn run(viewer: &mut Viewer, input: &mut InputState, json: Value) -> CommandResponse {
        handle_command(&request(json), viewer, input)
    }

    #[test]
    fn test_command_request_parse() {
        let req = request(json!({"cmd": "assign_part", "role": "left_leg", "index": 1}));
        assert_eq!(req.cmd, "assign_part");
        assert_eq!(req.params["index"], json!(1));
    }

    #[test]
    fn test_command_response_error() {
        let resp = CommandResponse::error("something broke");
        assert_eq!(resp.status, "error");
        assert_eq!(resp.message.unwrap(), "something broke");
    }

    #[test]
    fn test_list_and_assign_parts() {
        let (mut viewer, mut input) = setup();
        let resp = run(&mut viewer, &mut input, json!({"cmd": "assign_part", "role": "leftLeg", "index": 1}));
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.data.unwrap()["name"], json!("LegL"));

        let resp = run(&mut viewer, &mut input, json!({"cmd": "list_parts"}));
        let data = resp.data.unwrap();
        assert_eq!(data["count"], json!(3));
        assert_eq!(data["parts"][1]["roles"], json!(["left_leg"]));
        assert_eq!(data["parts"][2]["name"], json!("Part_2"));

        let resp = run(&mut viewer, &mut input, json!({"cmd": "assign_part", "role": "left_leg", "index": 9}));
        assert_eq!(resp.status, "error");
        let resp = run(&mut viewer, &mut input, json!({"cmd": "assign_part", "role": "tail", "index": 0}));
        assert_eq!(resp.status, "error");
    }

    #[test]
    fn test_set_speed_accepts_text_and_rejects_out_of_range() {
        let (mut viewer, mut input) = setup();
        let resp = run(&mut viewer, &mut input, json!({"cmd": "set_speed", "value": "2"}));
        assert_eq!(resp.data.unwrap()["speed"], json!("2x"));
        for bad in [json!("fast"), json!(10.0), json!(null)] {
            let resp = run(&mut viewer, &mut input, json!({"cmd": "set_speed", "value": bad}));
            assert_eq!(resp.status, "error");
        }
        assert_eq!(viewer.speed_multiplier(), 2.0);
    }

    #[test]
    fn test_test_jump_requires_model() {
        let mut viewer = Viewer::new(ControllerConfig::default());
        let mut input = InputState::new(InputBindings::default());
        let resp = run(&mut viewer, &mut input, json!({"cmd": "test_jump"}));
        assert_eq!(resp.status, "error");

        let (mut viewer, mut input) = setup();
        let resp = run(&mut viewer, &mut input, json!({"cmd": "test_jump"}));
        assert_eq!(resp.data.unwrap()["started"], json!(true));
        let resp = run(&mut viewer, &mut input, json!({"cmd": "test_jump"}));
        assert_eq!(resp.data.unwrap()["started"], json!(false));
    }

    #[test]
    fn test_panel_toggles_and_events() {
        let (mut viewer, mut input) = setup();
        let resp = run(&mut viewer, &mut input, json!({"cmd": "toggle_category", "role": "right_arm"}));
        assert_eq!(resp.data.unwrap()["collapsed"], json!(true));
        let resp = run(&mut viewer, &mut input, json!({"cmd": "panel"}));
        assert_eq!(resp.status, "ok");

        run(&mut viewer, &mut input, json!({"cmd": "reset_parts"}));
        viewer.events.flush();
        let resp = run(&mut viewer, &mut input, json!({"cmd": "query_events", "filter": "bindings.cleared"}));
        assert_eq!(resp.data.unwrap()["count"], json!(1));
    }

    #[test]
    fn test_inject_input_drives_snapshot() {
        let (mut viewer, mut input) = setup();
        let resp = run(&mut viewer, &mut input, json!({"cmd": "inject_input", "action": "key_press", "key": "W"}));
        assert_eq!(resp.status, "ok");
        run(&mut viewer, &mut input, json!({"cmd": "inject_input", "action": "joystick", "x": 0.5, "y": -1.0}));
        input.begin_frame();
        let snapshot = input.snapshot();
        assert!(snapshot.keys.forward);
        assert!(snapshot.joystick.active);

        let resp = run(&mut viewer, &mut input, json!({"cmd": "inject_input", "action": "key_press", "key": "Nope"}));
        assert_eq!(resp.status, "error");
    }
}
