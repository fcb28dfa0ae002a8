use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Separates the filesystem part of a path identity from its symbol chain.
pub const SYMBOL_DELIMITER: char = '#';

/// Unique key of an annotated item within a product.
///
/// A slash-separated relative path, optionally followed by `#`-separated
/// symbol names in outer-to-inner order: `src/a.ts#Bar#foo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathIdentity(String);

impl PathIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_symbol(&self) -> bool {
        self.0.contains(SYMBOL_DELIMITER)
    }

    /// The filesystem part, without any symbol segments.
    pub fn file_part(&self) -> &str {
        self.0
            .split(SYMBOL_DELIMITER)
            .next()
            .unwrap_or(self.0.as_str())
    }

    pub fn child_symbol(&self, name: &str) -> PathIdentity {
        PathIdentity(format!("{}{}{}", self.0, SYMBOL_DELIMITER, name))
    }

    /// Display name: innermost symbol for symbol paths, base name otherwise.
    pub fn name(&self) -> &str {
        if let Some((_, symbol)) = self.0.rsplit_once(SYMBOL_DELIMITER) {
            return symbol;
        }
        self.0.rsplit('/').next().unwrap_or(self.0.as_str())
    }

    /// Parent linkage: truncated at the last symbol delimiter when present,
    /// otherwise at the last directory separator.
    pub fn parent(&self) -> Option<PathIdentity> {
        let cut = self
            .0
            .rfind(SYMBOL_DELIMITER)
            .or_else(|| self.0.rfind('/'))?;
        if cut == 0 {
            return None;
        }
        Some(PathIdentity(self.0[..cut].to_string()))
    }

    /// Type guessed from the shape of the path alone.
    pub fn inferred_type(&self) -> ItemType {
        if self.is_symbol() {
            ItemType::Function
        } else if Path::new(&self.0).extension().is_some() {
            ItemType::File
        } else {
            ItemType::Folder
        }
    }
}

impl fmt::Display for PathIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PathIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PathIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemType {
    Folder,
    File,
    Class,
    Struct,
    Function,
    Variable,
    Enum,
    EnumMember,
    Namespace,
    Field,
    Unknown,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Folder => "folder",
            ItemType::File => "file",
            ItemType::Class => "class",
            ItemType::Struct => "struct",
            ItemType::Function => "function",
            ItemType::Variable => "variable",
            ItemType::Enum => "enum",
            ItemType::EnumMember => "enumMember",
            ItemType::Namespace => "namespace",
            ItemType::Field => "field",
            ItemType::Unknown => "unknown",
        }
    }

    pub fn is_symbol(self) -> bool {
        !matches!(self, ItemType::Folder | ItemType::File)
    }
}

impl FromStr for ItemType {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "folder" => ItemType::Folder,
            "file" => ItemType::File,
            "class" => ItemType::Class,
            "struct" => ItemType::Struct,
            "function" => ItemType::Function,
            "variable" => ItemType::Variable,
            "enum" => ItemType::Enum,
            "enumMember" => ItemType::EnumMember,
            "namespace" => ItemType::Namespace,
            "field" => ItemType::Field,
            _ => ItemType::Unknown,
        })
    }
}

/// Symbol classification reported by a symbol provider (LSP symbol kinds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SymbolKind {
    File,
    Module,
    Namespace,
    Package,
    Class,
    Method,
    Property,
    Field,
    Constructor,
    Enum,
    Interface,
    Function,
    Variable,
    Constant,
    String,
    Number,
    Boolean,
    Array,
    Object,
    Key,
    Null,
    EnumMember,
    Struct,
    Event,
    Operator,
    TypeParameter,
    #[serde(other)]
    Other,
}

impl SymbolKind {
    pub fn item_type(self) -> ItemType {
        match self {
            SymbolKind::Class | SymbolKind::Interface => ItemType::Class,
            SymbolKind::Struct => ItemType::Struct,
            SymbolKind::Function
            | SymbolKind::Method
            | SymbolKind::Constructor
            | SymbolKind::Operator => ItemType::Function,
            SymbolKind::Variable | SymbolKind::Constant => ItemType::Variable,
            SymbolKind::Field | SymbolKind::Property => ItemType::Field,
            SymbolKind::Enum => ItemType::Enum,
            SymbolKind::EnumMember => ItemType::EnumMember,
            SymbolKind::Namespace | SymbolKind::Module | SymbolKind::Package => {
                ItemType::Namespace
            }
            _ => ItemType::Unknown,
        }
    }
}

/// One entry of a context tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub path: PathIdentity,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub description: String,
}

impl Node {
    pub fn new(path: PathIdentity, item_type: ItemType, description: impl Into<String>) -> Self {
        Self {
            name: path.name().to_string(),
            path,
            item_type,
            description: description.into(),
        }
    }
}

/// Ordered root-to-leaf breadcrumb of nodes.
pub type ContextTree = Vec<Node>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
}

/// Zero-based cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }
}

/// Nested, range-annotated symbol as produced by a symbol provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub range: Range,
    #[serde(default)]
    pub children: Vec<DocumentSymbol>,
}

/// Raw stored row, as returned by hierarchical queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredItem {
    pub path: PathIdentity,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub description: Option<String>,
    pub parent_path: Option<PathIdentity>,
    pub updated_at: i64,
}
