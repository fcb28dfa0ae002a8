use serde_json::{Value, json};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use wit::config::Config;
use wit::db::DescriptionStore;
use wit::model::{ItemType, Node, PathIdentity};
use wit::outline::{NoSymbols, OutlineProvider};
use wit::protocol::JsonlSink;
use wit::session::Session;
use wit::sync::SessionContext;

fn open_store(dir: &TempDir) -> (SessionContext, Arc<DescriptionStore>) {
    let store =
        DescriptionStore::open(&dir.path().join("wit.sqlite"), &Config::default()).unwrap();
    let product = store.ensure_product("widgets").unwrap();
    let context = SessionContext {
        product,
        workspace_root: dir.path().join("repo"),
        default_description: "none yet".to_string(),
    };
    (context, Arc::new(store))
}

fn run_lines(session: Session<JsonlSink<Vec<u8>>>, lines: &[Value]) -> Vec<Value> {
    let mut input = String::new();
    for line in lines {
        input.push_str(&line.to_string());
        input.push('\n');
    }
    let sink = session.run(Cursor::new(input.into_bytes()));
    let output = String::from_utf8(sink.into_inner()).unwrap();
    output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn last_update(messages: &[Value]) -> &Value {
    messages
        .iter()
        .rev()
        .find(|message| message["command"] == "updateInfo")
        .expect("no updateInfo emitted")
}

#[test]
fn selection_with_host_symbols_round_trips_over_jsonl() {
    let dir = TempDir::new().unwrap();
    let (context, store) = open_store(&dir);
    store
        .upsert(
            context.product.id,
            &Node::new(
                PathIdentity::from("src/a.ts#Bar"),
                ItemType::Class,
                "the bar",
            ),
        )
        .unwrap();
    let file = dir.path().join("repo/src/a.ts");

    let session = Session::active(context, store, Box::new(NoSymbols), JsonlSink::new(Vec::new()));
    let messages = run_lines(
        session,
        &[
            json!({"command": "activeFileChanged", "path": file}),
            json!({
                "command": "selectionChanged",
                "path": file,
                "line": 5,
                "character": 2,
                "symbols": [{
                    "name": "Bar",
                    "kind": "class",
                    "range": {"start": {"line": 0, "character": 0}, "end": {"line": 30, "character": 1}},
                    "children": [{
                        "name": "foo",
                        "kind": "method",
                        "range": {"start": {"line": 3, "character": 2}, "end": {"line": 9, "character": 3}}
                    }]
                }]
            }),
            json!({"command": "shutdown"}),
        ],
    );

    let update = last_update(&messages);
    assert_eq!(
        update["data"]["tree"],
        json!([
            {"name": "src", "path": "src", "type": "folder", "description": "none yet"},
            {"name": "a.ts", "path": "src/a.ts", "type": "file", "description": "none yet"},
            {"name": "Bar", "path": "src/a.ts#Bar", "type": "class", "description": "the bar"},
            {"name": "foo", "path": "src/a.ts#Bar#foo", "type": "function", "description": "none yet"}
        ])
    );
    assert_eq!(update["data"]["selectedSymbol"]["path"], "src/a.ts#Bar#foo");
    assert!(
        messages
            .iter()
            .any(|message| *message == json!({"command": "setLoading", "isLoading": true}))
    );
}

#[test]
fn malformed_and_unknown_lines_are_ignored() {
    let dir = TempDir::new().unwrap();
    let (context, store) = open_store(&dir);
    let session = Session::active(context, store, Box::new(NoSymbols), JsonlSink::new(Vec::new()));
    let messages = run_lines(
        session,
        &[
            json!({"command": "runScript", "script": "rm -rf /"}),
            json!({"path": "/repo/a.ts"}),
            json!({"command": "panelVisible"}),
        ],
    );
    assert_eq!(
        messages,
        vec![json!({"command": "updateInfo", "data": {"tree": [], "selectedSymbol": null}})]
    );
}

#[test]
fn built_in_outline_is_used_without_host_symbols() {
    let dir = TempDir::new().unwrap();
    let (context, store) = open_store(&dir);
    let src = dir.path().join("repo/src");
    std::fs::create_dir_all(&src).unwrap();
    let file = src.join("lib.rs");
    std::fs::write(&file, "pub struct Engine;\n\nimpl Engine {\n    pub fn start(&self) {\n        println!(\"go\");\n    }\n}\n").unwrap();

    let session = Session::active(
        context,
        store,
        Box::new(OutlineProvider::new()),
        JsonlSink::new(Vec::new()),
    );
    let messages = run_lines(
        session,
        &[
            json!({"command": "activeFileChanged", "path": file}),
            json!({"command": "selectionChanged", "line": 4, "character": 8}),
        ],
    );
    let paths: Vec<&str> = last_update(&messages)["data"]["tree"]
        .as_array()
        .unwrap()
        .iter()
        .map(|node| node["path"].as_str().unwrap())
        .collect();
    assert_eq!(
        paths,
        vec!["src", "src/lib.rs", "src/lib.rs#Engine", "src/lib.rs#Engine#start"]
    );
}

#[test]
fn edit_is_written_through_to_the_store() {
    let dir = TempDir::new().unwrap();
    let (context, store) = open_store(&dir);
    let product_id = context.product.id;
    let file = dir.path().join("repo/docs/guide.md");

    let mut session = Session::active(
        context,
        Arc::clone(&store),
        Box::new(NoSymbols),
        JsonlSink::new(Vec::new()),
    );
    session.dispatch(wit::protocol::Inbound::ActiveFileChanged { path: Some(file) });
    session.settle();
    session.dispatch(wit::protocol::Inbound::UpdateDescription {
        path: PathIdentity::from("docs/guide.md"),
        description: "How to use it".to_string(),
    });
    session.settle();

    let item = store
        .get_item(product_id, &PathIdentity::from("docs/guide.md"))
        .unwrap()
        .unwrap();
    assert_eq!(item.description.as_deref(), Some("How to use it"));
    assert_eq!(item.item_type, ItemType::File);
    assert_eq!(item.parent_path, Some(PathIdentity::from("docs")));

    let children = store
        .children(product_id, Some(&PathIdentity::from("docs")))
        .unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name, "guide.md");
}
