use crate::model::{DocumentSymbol, PathIdentity, Position};

/// Descent stops after this many nested levels; deeper symbols are ignored.
pub const MAX_SYMBOL_DEPTH: usize = 64;

/// Chain of symbols containing `position`, outermost first.
///
/// At every level the first sibling in document order whose range contains
/// the position is taken. Providers are expected to report non-overlapping
/// sibling ranges; when they overlap, the first match still wins.
pub fn resolve_chain(forest: &[DocumentSymbol], position: Position) -> Vec<&DocumentSymbol> {
    let mut chain = Vec::new();
    let mut level = forest;
    while chain.len() < MAX_SYMBOL_DEPTH {
        let Some(hit) = level.iter().find(|symbol| symbol.range.contains(position)) else {
            break;
        };
        chain.push(hit);
        level = &hit.children;
    }
    chain
}

/// Innermost symbol containing `position`.
pub fn deepest(forest: &[DocumentSymbol], position: Position) -> Option<&DocumentSymbol> {
    resolve_chain(forest, position).pop()
}

/// Path identities for a resolved chain inside `file`: `file#A`, `file#A#B`, ...
pub fn chain_identities<'a>(
    file: &PathIdentity,
    chain: &[&'a DocumentSymbol],
) -> Vec<(PathIdentity, &'a DocumentSymbol)> {
    let mut current = file.clone();
    chain
        .iter()
        .map(|symbol| {
            current = current.child_symbol(&symbol.name);
            (current.clone(), *symbol)
        })
        .collect()
}
