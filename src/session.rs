//! Runtime around the sync controller: one event loop, lookups on worker
//! threads, upserts on a single ordered writer, outbound commands to a sink.

use crate::config::Config;
use crate::db::DescriptionStore;
use crate::error::{ProductError, SessionError, StoreError};
use crate::model::{DocumentSymbol, PathIdentity, Position};
use crate::outline::SymbolProvider;
use crate::product;
use crate::protocol::{self, Inbound, Outbound, Sink, TreeView};
use crate::sync::{Cycle, EditRequest, SessionContext, SyncController};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use tracing::{debug, error, info, warn};

/// Everything the loop reacts to, in arrival order.
pub enum Event {
    Inbound(Inbound),
    LookupDone {
        cycle: Cycle,
        result: Result<HashMap<PathIdentity, Option<String>>, StoreError>,
    },
    UpsertDone {
        edit: EditRequest,
        result: Result<(), StoreError>,
    },
    InputClosed,
}

enum Mode {
    Active {
        controller: SyncController,
        store: Arc<DescriptionStore>,
        writer: Sender<EditRequest>,
    },
    Disabled,
}

/// Product name for the workspace: the configured override, else the
/// remote of the enclosing git repository.
pub fn product_name(root: &Path, config: &Config) -> Result<String, ProductError> {
    if let Some(name) = &config.product_name {
        return Ok(name.clone());
    }
    let repo_root = product::discover_repo_root(root).unwrap_or_else(|| root.to_path_buf());
    product::resolve(&repo_root)
}

/// Open the store and pin the product for this session.
pub fn bootstrap(
    root: &Path,
    config: &Config,
) -> Result<(SessionContext, Arc<DescriptionStore>), SessionError> {
    let store = DescriptionStore::open(&config.db_path_for(root), config)?;
    let name = product_name(root, config)?;
    let product = store.ensure_product(&name)?;
    info!("session product {} (id {})", product.name, product.id);
    let context = SessionContext {
        product,
        workspace_root: root.to_path_buf(),
        default_description: config.default_description.clone(),
    };
    Ok((context, Arc::new(store)))
}

/// Resolve and annotate the context tree for a single location, running the
/// same cycles a live session would but with blocking store calls.
pub fn resolve_tree(
    context: SessionContext,
    store: &DescriptionStore,
    provider: &mut dyn SymbolProvider,
    file: &Path,
    position: Option<Position>,
) -> TreeView {
    let product_id = context.product.id;
    let mut controller = SyncController::new(context);
    if let Some(cycle) = controller.file_changed(Some(file)) {
        let fetched = store.get_many(product_id, cycle.lookups());
        controller.complete(cycle, fetched);
    }
    if let Some(position) = position {
        let symbols = provider.document_symbols(file);
        if let Some(cycle) = controller.cursor_changed(symbols.as_deref(), position) {
            let fetched = store.get_many(product_id, cycle.lookups());
            controller.complete(cycle, fetched);
        }
    }
    TreeView {
        tree: controller.cache().snapshot(),
        selected_symbol: controller.cache().focused().cloned(),
    }
}

pub struct Session<S: Sink> {
    mode: Mode,
    provider: Box<dyn SymbolProvider>,
    sink: S,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    outstanding: usize,
    closing: bool,
}

impl<S: Sink> Session<S> {
    /// Bootstrap a session for `root`. Startup failures produce a disabled
    /// session that reports the problem once and ignores further events.
    pub fn start(root: &Path, config: &Config, provider: Box<dyn SymbolProvider>, sink: S) -> Self {
        match bootstrap(root, config) {
            Ok((context, store)) => Self::active(context, store, provider, sink),
            Err(err) => {
                error!("session disabled: {}", err);
                Self::disabled(&err.to_string(), provider, sink)
            }
        }
    }

    pub fn active(
        context: SessionContext,
        store: Arc<DescriptionStore>,
        provider: Box<dyn SymbolProvider>,
        sink: S,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let writer = spawn_writer(Arc::clone(&store), context.product.id, tx.clone());
        let controller = SyncController::new(context);
        let mode = Mode::Active {
            controller,
            store,
            writer,
        };
        Self::with_channel(mode, provider, sink, tx, rx)
    }

    pub fn disabled(reason: &str, provider: Box<dyn SymbolProvider>, sink: S) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut session = Self::with_channel(Mode::Disabled, provider, sink, tx, rx);
        session.emit(&Outbound::error(format!(
            "Descriptions are unavailable: {reason}"
        )));
        session
    }

    fn with_channel(
        mode: Mode,
        provider: Box<dyn SymbolProvider>,
        sink: S,
        tx: Sender<Event>,
        rx: Receiver<Event>,
    ) -> Self {
        Self {
            mode,
            provider,
            sink,
            tx,
            rx,
            outstanding: 0,
            closing: false,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.mode, Mode::Disabled)
    }

    pub fn controller(&self) -> Option<&SyncController> {
        match &self.mode {
            Mode::Active { controller, .. } => Some(controller),
            Mode::Disabled => None,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Store round-trips dispatched but not yet handled.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Read JSONL messages from `input` until it closes or a shutdown
    /// arrives, then drain in-flight work and hand back the sink.
    pub fn run<R: BufRead + Send + 'static>(mut self, input: R) -> S {
        let tx = self.tx.clone();
        thread::spawn(move || read_input(input, tx));

        while let Ok(event) = self.rx.recv() {
            self.handle(event);
            if self.closing && self.outstanding == 0 {
                break;
            }
        }
        info!("session finished");
        self.sink
    }

    pub fn dispatch(&mut self, message: Inbound) {
        self.handle(Event::Inbound(message));
    }

    /// Block until every dispatched round-trip has been handled.
    pub fn settle(&mut self) {
        while self.outstanding > 0 {
            match self.rx.recv() {
                Ok(event) => self.handle(event),
                Err(_) => break,
            }
        }
    }

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Inbound(message) => self.on_message(message),
            Event::LookupDone { cycle, result } => {
                self.outstanding = self.outstanding.saturating_sub(1);
                if let Mode::Active { controller, .. } = &mut self.mode {
                    controller.complete(cycle, result);
                }
            }
            Event::UpsertDone { edit, result } => {
                self.outstanding = self.outstanding.saturating_sub(1);
                if let Mode::Active { controller, .. } = &mut self.mode {
                    controller.complete_edit(edit, result);
                }
            }
            Event::InputClosed => {
                debug!("input closed");
                self.closing = true;
            }
        }
        self.flush();
    }

    fn on_message(&mut self, message: Inbound) {
        if matches!(message, Inbound::Shutdown {}) {
            info!("shutdown requested");
            self.closing = true;
            return;
        }
        if matches!(self.mode, Mode::Disabled) {
            debug!("session disabled, ignoring message");
            return;
        }

        let position = message.position();
        match message {
            Inbound::ActiveFileChanged { path } => {
                let cycle = self
                    .controller_mut()
                    .and_then(|controller| controller.file_changed(path.as_deref()));
                if let Some(cycle) = cycle {
                    self.start_lookup(cycle);
                }
            }
            Inbound::SelectionChanged { path, symbols, .. } => {
                let Some(position) = position else {
                    return;
                };
                self.on_selection(path, symbols, position);
            }
            Inbound::PanelVisible {} => {
                if let Some(controller) = self.controller_mut() {
                    controller.redraw();
                }
            }
            Inbound::UpdateDescription { path, description } => {
                let request = match self.controller_mut() {
                    Some(controller) => controller.begin_edit(&path, &description),
                    None => return,
                };
                match request {
                    Ok(edit) => self.start_upsert(edit),
                    Err(err) => debug!("edit dropped: {}", err),
                }
            }
            Inbound::Shutdown {} => {}
        }
    }

    fn on_selection(
        &mut self,
        path: Option<PathBuf>,
        symbols: Option<Vec<DocumentSymbol>>,
        position: Position,
    ) {
        // A selection in another file implies the host skipped the switch.
        if let Some(path) = path {
            let switched = self
                .controller()
                .map(|controller| controller.active_file() != Some(path.as_path()))
                .unwrap_or(false);
            if switched {
                let cycle = self
                    .controller_mut()
                    .and_then(|controller| controller.file_changed(Some(&path)));
                if let Some(cycle) = cycle {
                    self.start_lookup(cycle);
                }
            }
        }

        let Some(active) = self
            .controller()
            .and_then(|controller| controller.active_file())
            .map(Path::to_path_buf)
        else {
            debug!("selection without file context");
            return;
        };
        let symbols = symbols.or_else(|| self.provider.document_symbols(&active));
        if let Some(cycle) = self
            .controller_mut()
            .and_then(|controller| controller.cursor_changed(symbols.as_deref(), position))
        {
            self.start_lookup(cycle);
        }
    }

    fn controller_mut(&mut self) -> Option<&mut SyncController> {
        match &mut self.mode {
            Mode::Active { controller, .. } => Some(controller),
            Mode::Disabled => None,
        }
    }

    fn start_lookup(&mut self, cycle: Cycle) {
        let Mode::Active {
            controller, store, ..
        } = &mut self.mode
        else {
            return;
        };
        if cycle.lookups().is_empty() {
            controller.complete(cycle, Ok(HashMap::new()));
            return;
        }
        let store = Arc::clone(store);
        let product_id = controller.context().product.id;
        let tx = self.tx.clone();
        self.outstanding += 1;
        thread::spawn(move || {
            let result = store.get_many(product_id, cycle.lookups());
            if tx.send(Event::LookupDone { cycle, result }).is_err() {
                debug!("session gone before lookup completed");
            }
        });
    }

    fn start_upsert(&mut self, edit: EditRequest) {
        let Mode::Active {
            controller, writer, ..
        } = &mut self.mode
        else {
            return;
        };
        match writer.send(edit) {
            Ok(()) => self.outstanding += 1,
            Err(mpsc::SendError(edit)) => {
                warn!("description writer stopped, edit for {} not saved", edit.node().path);
                controller.complete_edit(edit, Err(StoreError::Disconnected));
            }
        }
    }

    fn flush(&mut self) {
        let messages = match self.controller_mut() {
            Some(controller) => controller.drain_outbox(),
            None => return,
        };
        for message in &messages {
            self.emit(message);
        }
    }

    fn emit(&mut self, message: &Outbound) {
        if let Err(err) = self.sink.send(message) {
            error!("failed to write outbound message: {}", err);
            self.closing = true;
        }
    }
}

/// Single writer thread: upserts are applied and reported back in the order
/// they were requested, so the last edit of a path is the one that sticks.
fn spawn_writer(
    store: Arc<DescriptionStore>,
    product_id: i64,
    events: Sender<Event>,
) -> Sender<EditRequest> {
    let (tx, rx) = mpsc::channel::<EditRequest>();
    thread::spawn(move || {
        for edit in rx {
            let result = store.upsert(product_id, edit.node());
            if events.send(Event::UpsertDone { edit, result }).is_err() {
                debug!("session gone, stopping description writer");
                break;
            }
        }
    });
    tx
}

fn read_input<R: BufRead>(input: R, tx: Sender<Event>) {
    for line in input.lines() {
        let line = match line {
            Ok(value) => value,
            Err(err) => {
                warn!("input error: {}", err);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match protocol::parse_inbound(&line) {
            Ok(message) => {
                if tx.send(Event::Inbound(message)).is_err() {
                    return;
                }
            }
            Err(err) => warn!("rejected inbound line: {}", err),
        }
    }
    let _ = tx.send(Event::InputClosed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemType, Node, Range, SymbolKind};
    use crate::outline::NoSymbols;
    use crate::protocol::MessageLevel;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn active_session(dir: &TempDir) -> (Session<Vec<Outbound>>, Arc<DescriptionStore>) {
        let store = Arc::new(
            DescriptionStore::open(&dir.path().join("wit.sqlite"), &Config::default()).unwrap(),
        );
        let product = store.ensure_product("widgets").unwrap();
        let context = SessionContext {
            product,
            workspace_root: PathBuf::from("/repo"),
            default_description: "(none)".to_string(),
        };
        let session = Session::active(context, Arc::clone(&store), Box::new(NoSymbols), Vec::new());
        (session, store)
    }

    fn last_tree(sink: &[Outbound]) -> Vec<(String, String)> {
        sink.iter()
            .rev()
            .find_map(|message| match message {
                Outbound::UpdateInfo { data } => Some(
                    data.tree
                        .iter()
                        .map(|node| (node.path.to_string(), node.description.clone()))
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default()
    }

    #[test]
    fn file_change_publishes_stored_descriptions() {
        let dir = TempDir::new().unwrap();
        let (mut session, store) = active_session(&dir);
        let product = session.controller().unwrap().context().product.clone();
        store
            .upsert(
                product.id,
                &Node::new(PathIdentity::from("src"), ItemType::Folder, "sources"),
            )
            .unwrap();

        session.dispatch(Inbound::ActiveFileChanged {
            path: Some(PathBuf::from("/repo/src/a.ts")),
        });
        session.settle();

        assert_eq!(
            last_tree(session.sink()),
            vec![
                ("src".to_string(), "sources".to_string()),
                ("src/a.ts".to_string(), "(none)".to_string()),
            ]
        );
        assert_eq!(
            session.sink().first(),
            Some(&Outbound::SetLoading { is_loading: true })
        );
    }

    #[test]
    fn edit_is_persisted_and_survives_restart() {
        let dir = TempDir::new().unwrap();
        let (mut session, store) = active_session(&dir);
        session.dispatch(Inbound::ActiveFileChanged {
            path: Some(PathBuf::from("/repo/src/a.ts")),
        });
        session.settle();

        session.dispatch(Inbound::UpdateDescription {
            path: PathIdentity::from("src/a.ts"),
            description: "entry point".to_string(),
        });
        session.settle();

        let product_id = session.controller().unwrap().context().product.id;
        let stored = store
            .get_many(product_id, &[PathIdentity::from("src/a.ts")])
            .unwrap();
        assert_eq!(
            stored.get(&PathIdentity::from("src/a.ts")).cloned().flatten(),
            Some("entry point".to_string())
        );

        drop(session);
        let (mut session, _store) = active_session(&dir);
        session.dispatch(Inbound::ActiveFileChanged {
            path: Some(PathBuf::from("/repo/src/a.ts")),
        });
        session.settle();
        assert_eq!(last_tree(session.sink())[1].1, "entry point");
    }

    #[test]
    fn back_to_back_edits_leave_store_and_cache_on_last_edit() {
        let dir = TempDir::new().unwrap();
        let (mut session, store) = active_session(&dir);
        session.dispatch(Inbound::ActiveFileChanged {
            path: Some(PathBuf::from("/repo/src/a.ts")),
        });
        session.settle();
        let product_id = session.controller().unwrap().context().product.id;
        let path = PathIdentity::from("src/a.ts");

        for round in 0..100 {
            let first = format!("edit-{}", round * 2);
            let last = format!("edit-{}", round * 2 + 1);
            session.dispatch(Inbound::UpdateDescription {
                path: path.clone(),
                description: first,
            });
            session.dispatch(Inbound::UpdateDescription {
                path: path.clone(),
                description: last.clone(),
            });
            assert_eq!(session.outstanding(), 2);
            session.settle();

            let stored = store
                .get_many(product_id, std::slice::from_ref(&path))
                .unwrap()
                .remove(&path)
                .flatten();
            let cached = session
                .controller()
                .unwrap()
                .cache()
                .get(&path)
                .map(|node| node.description.clone());
            assert_eq!(stored.as_deref(), Some(last.as_str()), "round {round}");
            assert_eq!(cached, Some(last), "round {round}");
        }
        assert_eq!(store.item_count(product_id).unwrap(), 1);
    }

    #[test]
    fn edit_for_unknown_path_is_dropped() {
        let dir = TempDir::new().unwrap();
        let (mut session, store) = active_session(&dir);
        session.dispatch(Inbound::UpdateDescription {
            path: PathIdentity::from("nowhere.ts"),
            description: "x".to_string(),
        });
        assert_eq!(session.outstanding(), 0);
        let product_id = session.controller().unwrap().context().product.id;
        assert_eq!(store.item_count(product_id).unwrap(), 0);
    }

    #[test]
    fn selection_uses_host_symbols() {
        let dir = TempDir::new().unwrap();
        let (mut session, _store) = active_session(&dir);
        let bar = DocumentSymbol {
            name: "Bar".to_string(),
            kind: SymbolKind::Class,
            range: Range::new(Position::new(0, 0), Position::new(20, 0)),
            children: vec![DocumentSymbol {
                name: "foo".to_string(),
                kind: SymbolKind::Method,
                range: Range::new(Position::new(2, 0), Position::new(8, 0)),
                children: Vec::new(),
            }],
        };
        session.dispatch(Inbound::SelectionChanged {
            path: Some(PathBuf::from("/repo/src/a.ts")),
            line: 4,
            character: 2,
            symbols: Some(vec![bar]),
        });
        session.settle();

        let controller = session.controller().unwrap();
        let types: Vec<String> = controller
            .cache()
            .snapshot()
            .iter()
            .map(|node| format!("{}:{}", node.path, node.item_type.as_str()))
            .collect();
        assert_eq!(
            types,
            vec![
                "src:folder",
                "src/a.ts:file",
                "src/a.ts#Bar:class",
                "src/a.ts#Bar#foo:function",
            ]
        );
        assert_eq!(
            controller.cache().focused().map(|node| node.name.as_str()),
            Some("foo")
        );
    }

    #[test]
    fn panel_visible_repushes_without_lookup() {
        let dir = TempDir::new().unwrap();
        let (mut session, _store) = active_session(&dir);
        session.dispatch(Inbound::ActiveFileChanged {
            path: Some(PathBuf::from("/repo/a.ts")),
        });
        session.settle();
        let before = session.sink().len();

        session.dispatch(Inbound::PanelVisible {});
        assert_eq!(session.outstanding(), 0);
        assert_eq!(session.sink().len(), before + 1);
        assert_eq!(last_tree(session.sink()), vec![("a.ts".to_string(), "(none)".to_string())]);
    }

    #[test]
    fn disabled_session_reports_once() {
        let mut session = Session::disabled("no repository", Box::new(NoSymbols), Vec::new());
        assert!(session.is_disabled());
        session.dispatch(Inbound::ActiveFileChanged {
            path: Some(PathBuf::from("/repo/a.ts")),
        });
        session.dispatch(Inbound::PanelVisible {});

        let sink = session.into_sink();
        assert_eq!(sink.len(), 1);
        assert!(matches!(
            &sink[0],
            Outbound::ShowMessage { level: MessageLevel::Error, message } if message.contains("no repository")
        ));
    }

    #[test]
    fn start_without_repository_is_disabled() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            db_path: Some(dir.path().join("wit.sqlite")),
            ..Config::default()
        };
        let session = Session::start(dir.path(), &config, Box::new(NoSymbols), Vec::new());
        assert!(session.is_disabled());
        assert_eq!(session.sink().len(), 1);
    }

    #[test]
    fn run_drains_inflight_work_before_returning() {
        let dir = TempDir::new().unwrap();
        let (session, _store) = active_session(&dir);
        let input = concat!(
            "{\"command\":\"activeFileChanged\",\"path\":\"/repo/old/one.rs\"}\n",
            "not json\n",
            "{\"command\":\"eval\"}\n",
            "{\"command\":\"activeFileChanged\",\"path\":\"/repo/new/two.rs\"}\n",
        );
        let sink = session.run(Cursor::new(input.as_bytes().to_vec()));
        assert_eq!(
            last_tree(&sink),
            vec![
                ("new".to_string(), "(none)".to_string()),
                ("new/two.rs".to_string(), "(none)".to_string()),
            ]
        );
        // Completion order varies; the indicator still ends switched off.
        let last_loading = sink.iter().rev().find_map(|message| match message {
            Outbound::SetLoading { is_loading } => Some(*is_loading),
            _ => None,
        });
        assert_eq!(last_loading, Some(false));
    }

    #[test]
    fn product_override_skips_git() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            product_name: Some("manual".to_string()),
            ..Config::default()
        };
        assert_eq!(product_name(dir.path(), &config).unwrap(), "manual");
        assert!(product_name(dir.path(), &Config::default()).is_err());
    }
}
