//! Integration tests for the submission pipeline.

use std::cell::RefCell;

use formcast::{
    decode_data_url, flatten, prepare, run, run_form, unflatten, BinaryUpload, Catalog,
    DispatchResult, Dispatcher, FieldSchema, FlatSubmission, Method, Operation, PreparedRequest,
    RawResponse, ResponseStatus, Session, SubmitError, Transport, TransportError,
};
use serde_json::{json, Value};

/// Answers every request with the same response and records what was sent.
struct Recorder {
    status: u16,
    body: &'static str,
    sent: RefCell<Vec<PreparedRequest>>,
}

impl Recorder {
    fn replying(status: u16, body: &'static str) -> Self {
        Self {
            status,
            body,
            sent: RefCell::new(Vec::new()),
        }
    }
}

impl Transport for Recorder {
    fn send(
        &self,
        request: &PreparedRequest,
        _session: &Session,
    ) -> Result<RawResponse, TransportError> {
        self.sent.borrow_mut().push(request.clone());
        Ok(RawResponse {
            status: self.status,
            body: self.body.to_string(),
            set_cookies: vec![],
        })
    }
}

fn operation(catalog_json: &str, name: &str) -> Operation {
    Catalog::load_str(catalog_json)
        .unwrap()
        .get(name)
        .cloned()
        .unwrap()
}

fn builtin(name: &str) -> Operation {
    Catalog::builtin().unwrap().get(name).cloned().unwrap()
}

// === Flatten/Unflatten Laws ===

mod codec_laws {
    use super::*;

    #[test]
    fn round_trip_reproduces_schema_shape() {
        let schema = FieldSchema::from_value(
            &json!({
                "title": "input",
                "author": { "name": "input", "contact": { "email": "input" } },
                "body": "textarea"
            }),
            "",
        )
        .unwrap();

        let entries: Vec<(String, Value)> = schema
            .leaves()
            .into_iter()
            .map(|leaf| {
                let value = Value::String(format!("value of {}", leaf.path));
                (leaf.path, value)
            })
            .collect();

        let payload = unflatten(entries).unwrap();

        assert_eq!(
            Value::Object(payload.clone()),
            json!({
                "title": "value of title",
                "author": {
                    "name": "value of author.name",
                    "contact": { "email": "value of author.contact.email" }
                },
                "body": "value of body"
            })
        );

        let mut keys: Vec<String> = flatten(&payload, &schema)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        keys.sort();
        let mut leaf_paths: Vec<String> = schema.leaves().into_iter().map(|l| l.path).collect();
        leaf_paths.sort();
        assert_eq!(keys, leaf_paths);
    }

    #[test]
    fn round_trip_restricted_to_populated_leaves() {
        let payload = unflatten(vec![
            ("author.name", json!("ana")),
            ("author.contact.email", json!("")),
            ("title", json!("")),
        ])
        .unwrap();
        assert_eq!(Value::Object(payload), json!({ "author": { "name": "ana" } }));
    }

    #[test]
    fn omission_is_idempotent() {
        let schema = FieldSchema::from_value(
            &json!({ "a": { "b": "input", "c": "input" }, "d": "input" }),
            "",
        )
        .unwrap();
        let once = unflatten(vec![
            ("a.b", json!("1")),
            ("a.c", json!("")),
            ("d", Value::Null),
        ])
        .unwrap();
        let twice = unflatten(flatten(&once, &schema)).unwrap();
        assert_eq!(once, twice);
        assert_eq!(Value::Object(twice), json!({ "a": { "b": "1" } }));
    }

    #[test]
    fn omission_is_idempotent_through_json_fields() {
        let op = operation(
            r#"[{"name": "Save", "endpoint": "/save", "method": "PUT",
                "fields": {"title": "input", "meta": "json"}}]"#,
            "Save",
        );
        let request = prepare(
            &op,
            FlatSubmission::new()
                .with("title", "")
                .with("meta", r#"{"note": "", "a.b": 1}"#),
        )
        .unwrap();

        let Some(Value::Object(once)) = request.body else {
            panic!("expected an object body");
        };
        assert_eq!(Value::Object(once.clone()), json!({ "meta": { "note": "", "a.b": 1 } }));

        let twice = unflatten(flatten(&once, &op.fields)).unwrap();
        assert_eq!(twice, once);
    }
}

// === Coercion Laws ===

mod coercion {
    use super::*;

    const CATALOG: &str = r#"[{
        "name": "Save Settings",
        "endpoint": "/api/settings",
        "method": "PUT",
        "fields": { "label": "input", "settings": "json" }
    }]"#;

    #[test]
    fn structured_text_decodes() {
        let op = operation(CATALOG, "Save Settings");
        let request = prepare(&op, FlatSubmission::new().with("settings", r#"{"a":1}"#)).unwrap();
        assert_eq!(request.body, Some(json!({ "settings": { "a": 1 } })));
    }

    #[test]
    fn invalid_structured_text_fails_before_dispatch() {
        let op = operation(CATALOG, "Save Settings");
        let recorder = Recorder::replying(200, "{}");
        let dispatcher = Dispatcher::new(recorder);

        let err = prepare(&op, FlatSubmission::new().with("settings", "{a:1}")).unwrap_err();
        assert!(matches!(err, SubmitError::InvalidStructuredText { .. }));

        let result = run(
            &dispatcher,
            &op,
            FlatSubmission::new().with("settings", "{a:1}"),
            &mut Session::anonymous(),
        );
        assert_eq!(result.status, ResponseStatus::Unavailable);
        assert!(result.body["details"]
            .as_str()
            .unwrap()
            .contains("settings"));
        assert!(dispatcher.transport().sent.borrow().is_empty());
    }

    #[test]
    fn text_is_never_parsed() {
        let op = operation(CATALOG, "Save Settings");
        let request = prepare(&op, FlatSubmission::new().with("label", "{a:1}")).unwrap();
        assert_eq!(request.body, Some(json!({ "label": "{a:1}" })));
    }
}

// === Templating Laws ===

mod templating {
    use super::*;

    #[test]
    fn placeholder_is_consumed() {
        let op = operation(
            r#"[{"name": "Edit", "endpoint": "/api/posts/:id", "method": "PATCH", "fields": {"id": "input", "content": "input"}}]"#,
            "Edit",
        );
        let request = prepare(
            &op,
            FlatSubmission::new().with("id", "42").with("content", "hi"),
        )
        .unwrap();

        assert_eq!(request.path, "/api/posts/42");
        assert_eq!(request.body, Some(json!({ "content": "hi" })));
    }

    #[test]
    fn placeholder_never_reaches_query() {
        let op = builtin("Get Users (empty for all)");
        let request = prepare(&op, FlatSubmission::new().with("username", "alice")).unwrap();
        assert_eq!(request.target(), "/api/users/alice");
        assert!(request.query.is_none());
    }

    #[test]
    fn blank_placeholder_lists_everything() {
        let op = builtin("Get Users (empty for all)");
        let request = prepare(&op, FlatSubmission::new().with("username", "")).unwrap();
        assert_eq!(request.target(), "/api/users/");
    }
}

// === Dispatch-Method Laws ===

mod dispatch_method {
    use super::*;

    #[test]
    fn get_sends_query_without_body() {
        let op = builtin("Get Posts (empty for all)");
        let request = prepare(&op, FlatSubmission::new().with("username", "alice")).unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.query.as_deref(), Some("username=alice"));
        assert!(request.body.is_none());
    }

    #[test]
    fn post_sends_body_without_query() {
        let op = builtin("Create User");
        let request = prepare(
            &op,
            FlatSubmission::new()
                .with("username", "alice")
                .with("password", "pw"),
        )
        .unwrap();
        assert!(request.query.is_none());
        assert_eq!(
            request.body,
            Some(json!({ "username": "alice", "password": "pw" }))
        );
    }
}

// === Binary Laws ===

mod binary {
    use super::*;

    #[test]
    fn single_upload_becomes_data_url() {
        let op = builtin("Create Post");
        let request = prepare(
            &op,
            FlatSubmission::new()
                .with("content", "look")
                .with("photo", BinaryUpload::from_bytes(vec![1, 2, 3])),
        )
        .unwrap();

        let body = request.body.unwrap();
        assert_eq!(body["content"], "look");
        let photo = body["photo"].as_str().unwrap();
        assert!(photo.starts_with("data:image/jpeg;base64,"));
        assert_eq!(decode_data_url(photo).unwrap().bytes, vec![1, 2, 3]);
    }

    #[test]
    fn nested_upload_lands_under_bare_name() {
        let op = operation(
            r#"[{"name": "Profile", "endpoint": "/api/profile", "method": "PUT",
                "fields": {"bio": "textarea", "media": {"avatar": "file:image/png"}}}]"#,
            "Profile",
        );
        let request = prepare(
            &op,
            FlatSubmission::new()
                .with("bio", "hello")
                .with("media.avatar", BinaryUpload::from_bytes(b"png".to_vec())),
        )
        .unwrap();

        let body = request.body.unwrap();
        assert_eq!(body["bio"], "hello");
        assert!(body["avatar"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert!(body.get("media").is_none());
    }

    #[test]
    fn upload_does_not_replace_text_value() {
        let op = operation(
            r#"[{"name": "Album", "endpoint": "/api/album", "method": "POST",
                "fields": {"media": {"photo": "file"}}}]"#,
            "Album",
        );
        let dispatcher = Dispatcher::new(Recorder::replying(200, "{}"));

        let result = run(
            &dispatcher,
            &op,
            FlatSubmission::new()
                .with("photo", "caption text")
                .with("media.photo", BinaryUpload::from_bytes(b"x".to_vec())),
            &mut Session::anonymous(),
        );

        assert_eq!(result.status, ResponseStatus::Unavailable);
        assert!(result.body["details"]
            .as_str()
            .unwrap()
            .contains("media.photo"));
        assert!(dispatcher.transport().sent.borrow().is_empty());
    }

    #[test]
    fn empty_upload_leaves_name_to_filled_one() {
        let op = operation(
            r#"[{"name": "Album", "endpoint": "/api/album", "method": "POST",
                "fields": {"photo": "file", "gallery": {"photo": "file"}}}]"#,
            "Album",
        );
        let request = prepare(
            &op,
            FlatSubmission::new()
                .with("photo", BinaryUpload::from_bytes(b"x".to_vec()))
                .with("gallery.photo", BinaryUpload::from_bytes(Vec::new())),
        )
        .unwrap();

        assert_eq!(
            request.body,
            Some(json!({ "photo": "data:image/jpeg;base64,eA==" }))
        );
    }
}

// === End-to-End ===

mod end_to_end {
    use super::*;

    #[test]
    fn patch_scenario() {
        let dispatcher = Dispatcher::new(Recorder::replying(200, r#"{"msg":"Post successfully updated!"}"#));
        let op = builtin("Update Post");

        let result = run(
            &dispatcher,
            &op,
            FlatSubmission::new()
                .with("id", "7")
                .with("content", "new text")
                .with("options.backgroundColor", ""),
            &mut Session::anonymous(),
        );

        assert_eq!(
            result,
            DispatchResult::completed(200, json!({ "msg": "Post successfully updated!" }))
        );

        let sent = dispatcher.transport().sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::Patch);
        assert_eq!(sent[0].path, "/api/posts/7");
        assert_eq!(sent[0].body, Some(json!({ "content": "new text" })));
    }

    #[test]
    fn form_with_reserved_keys() {
        let dispatcher = Dispatcher::new(Recorder::replying(200, "[]"));
        let catalog = Catalog::builtin().unwrap();

        let form = FlatSubmission::new()
            .with("$method", "DELETE")
            .with("$endpoint", "/api/comments/:id")
            .with("id", "c1");
        let result = run_form(&dispatcher, &catalog, form, &mut Session::anonymous());

        assert_eq!(result.status, ResponseStatus::Code(200));
        let sent = dispatcher.transport().sent.borrow();
        assert_eq!(sent[0].path, "/api/comments/c1");
        assert_eq!(sent[0].body, Some(json!({})));
    }

    #[test]
    fn conflicting_form_is_not_sent() {
        let dispatcher = Dispatcher::new(Recorder::replying(200, "{}"));
        let op = builtin("Update Post");

        let result = run(
            &dispatcher,
            &op,
            FlatSubmission::new()
                .with("options", "red")
                .with("options.backgroundColor", "blue"),
            &mut Session::anonymous(),
        );

        assert_eq!(result.status, ResponseStatus::Unavailable);
        assert!(dispatcher.transport().sent.borrow().is_empty());
    }
}
