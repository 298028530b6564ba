//! DevTools wire types for discovery and the `Runtime` domain.

use console_tap_core::{
    PropertyDescriptor, RemoteValueRef, RuntimeEvent, TargetInfo, TransportError,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Event: a console API was called.
pub const CONSOLE_API_CALLED: &str = "Runtime.consoleAPICalled";
/// Event: the debugger detached from the target.
pub const INSPECTOR_DETACHED: &str = "Inspector.detached";

/// One entry of `GET /json/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescription {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
    /// Missing while another client is attached.
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

impl From<TargetDescription> for TargetInfo {
    fn from(desc: TargetDescription) -> Self {
        Self {
            id: desc.id,
            url: desc.url,
            kind: desc.kind,
            websocket_url: desc.web_socket_debugger_url,
        }
    }
}

/// Outgoing command.
#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

/// Protocol-level error body.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Any incoming frame: a response carries `id`, an event carries `method`.
#[derive(Debug, Deserialize)]
pub struct Incoming {
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
}

/// Classified incoming frame.
#[derive(Debug)]
pub enum Frame {
    Response {
        id: u64,
        result: Result<Value, TransportError>,
    },
    Event {
        method: String,
        params: Value,
    },
    Unknown,
}

impl From<Incoming> for Frame {
    fn from(incoming: Incoming) -> Self {
        match incoming {
            Incoming {
                id: Some(id),
                error: Some(error),
                ..
            } => Self::Response {
                id,
                result: Err(TransportError::Remote {
                    code: error.code,
                    message: error.message,
                }),
            },
            Incoming {
                id: Some(id),
                result,
                ..
            } => Self::Response {
                id,
                result: Ok(result.unwrap_or(Value::Null)),
            },
            Incoming {
                method: Some(method),
                params,
                ..
            } => Self::Event { method, params },
            _ => Self::Unknown,
        }
    }
}

/// `Runtime.RemoteObject`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    /// `Some(Value::Null)` for an explicit `null`, `None` when absent.
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
    #[serde(default)]
    pub unserializable_value: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub object_id: Option<String>,
}

fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

impl From<RemoteObject> for RemoteValueRef {
    fn from(obj: RemoteObject) -> Self {
        if obj.kind == "object" {
            if let Some(id) = obj.object_id {
                return Self::ObjectHandle(id);
            }
        }
        if let Some(value) = obj.value {
            return Self::from_json(value);
        }
        obj.unserializable_value
            .or(obj.description)
            .map_or(Self::Undefined, Self::Description)
    }
}

/// Params of `Runtime.consoleAPICalled`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleApiCalled {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub args: Vec<RemoteObject>,
}

impl From<ConsoleApiCalled> for RuntimeEvent {
    fn from(call: ConsoleApiCalled) -> Self {
        Self {
            level: call.kind,
            args: call.args.into_iter().map(RemoteValueRef::from).collect(),
        }
    }
}

/// One entry of `Runtime.getProperties`.
#[derive(Debug, Clone, Deserialize)]
pub struct WirePropertyDescriptor {
    pub name: String,
    #[serde(default)]
    pub enumerable: bool,
    #[serde(default)]
    pub value: Option<RemoteObject>,
}

impl From<WirePropertyDescriptor> for PropertyDescriptor {
    fn from(prop: WirePropertyDescriptor) -> Self {
        Self {
            name: prop.name,
            enumerable: prop.enumerable,
            value: prop.value.map(RemoteValueRef::from),
        }
    }
}

/// Result of `Runtime.getProperties`.
#[derive(Debug, Clone, Deserialize)]
pub struct GetPropertiesResult {
    pub result: Vec<WirePropertyDescriptor>,
}

#[cfg(test)]
mod tests {
    use console_tap_core::Scalar;
    use serde_json::json;

    use super::*;

    fn remote(value: Value) -> RemoteValueRef {
        serde_json::from_value::<RemoteObject>(value).unwrap().into()
    }

    #[test]
    fn test_remote_object_conversion() {
        assert_eq!(
            remote(json!({"type": "number", "value": 5, "description": "5"})),
            RemoteValueRef::from(5)
        );
        assert_eq!(
            remote(json!({"type": "object", "subtype": "null", "value": null})),
            RemoteValueRef::Primitive(Scalar::Null)
        );
        assert_eq!(
            remote(json!({
                "type": "object",
                "className": "Object",
                "objectId": "O1",
                "description": "Object"
            })),
            RemoteValueRef::handle("O1")
        );
        assert_eq!(
            remote(json!({"type": "number", "unserializableValue": "NaN", "description": "NaN"})),
            RemoteValueRef::Description("NaN".into())
        );
        assert_eq!(
            remote(json!({"type": "function", "objectId": "F1", "description": "function f() {}"})),
            RemoteValueRef::Description("function f() {}".into())
        );
        assert_eq!(remote(json!({"type": "undefined"})), RemoteValueRef::Undefined);
    }

    #[test]
    fn test_console_event_parsing() {
        let params = json!({
            "type": "log",
            "args": [
                {"type": "string", "value": "hello"},
                {"type": "object", "objectId": "O1"}
            ],
            "executionContextId": 1,
            "timestamp": 1_700_000_000_000.0_f64
        });
        let call: ConsoleApiCalled = serde_json::from_value(params).unwrap();
        let event = RuntimeEvent::from(call);
        assert_eq!(event.level, "log");
        assert_eq!(
            event.args,
            vec![RemoteValueRef::string("hello"), RemoteValueRef::handle("O1")]
        );
    }

    #[test]
    fn test_frame_classification() {
        let ok: Incoming = serde_json::from_str(r#"{"id":3,"result":{}}"#).unwrap();
        assert!(matches!(Frame::from(ok), Frame::Response { id: 3, result: Ok(_) }));

        let err: Incoming =
            serde_json::from_str(r#"{"id":4,"error":{"code":-32000,"message":"nope"}}"#).unwrap();
        assert!(matches!(
            Frame::from(err),
            Frame::Response { id: 4, result: Err(TransportError::Remote { code: -32000, .. }) }
        ));

        let event: Incoming = serde_json::from_value(json!({
            "method": "Inspector.detached",
            "params": {"reason": "x"}
        }))
        .unwrap();
        assert!(matches!(
            Frame::from(event),
            Frame::Event { ref method, .. } if method == INSPECTOR_DETACHED
        ));
    }

    #[test]
    fn test_properties_result() {
        let body = json!({
            "result": [
                {"name": "x", "enumerable": true, "value": {"type": "number", "value": 1}},
                {"name": "length", "enumerable": false, "value": {"type": "number", "value": 1}},
                {"name": "get", "enumerable": true, "get": {"type": "function", "objectId": "g"}}
            ]
        });
        let parsed: GetPropertiesResult = serde_json::from_value(body).unwrap();
        let props: Vec<PropertyDescriptor> = parsed.result.into_iter().map(Into::into).collect();
        assert_eq!(props[0], PropertyDescriptor::new("x", RemoteValueRef::from(1)));
        assert!(!props[1].enumerable);
        assert_eq!(props[2].value, None);
    }

    #[test]
    fn test_target_description() {
        let body = json!([{
            "description": "",
            "devtoolsFrontendUrl": "/devtools/inspector.html",
            "id": "ABC",
            "title": "App",
            "type": "page",
            "url": "http://localhost:4000/",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/ABC"
        }]);
        let list: Vec<TargetDescription> = serde_json::from_value(body).unwrap();
        let info = TargetInfo::from(list[0].clone());
        assert_eq!(info.id, "ABC");
        assert_eq!(info.kind, "page");
        assert_eq!(info.websocket_url.as_deref(), Some("ws://127.0.0.1:9222/devtools/page/ABC"));
    }
}
