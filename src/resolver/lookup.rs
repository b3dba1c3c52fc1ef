use crate::model::{NodeId, Receiver, ScopeId, ScopeKind};
use crate::symbols::{FileSymbols, ScopedCall, SymbolTable};

use super::MatchKind;

/// Candidate definitions for `call` and the rule that found them.
pub(super) fn candidates(
    symbols: &SymbolTable,
    call: &ScopedCall,
) -> (Vec<NodeId>, Option<MatchKind>) {
    let file = symbols.file(call.file);
    let name = call.site.name.as_str();

    match &call.site.receiver {
        None => {
            if let Some(id) = lexical(file, call.scope, name) {
                return (vec![id], Some(MatchKind::Lexical));
            }
            (global_unqualified(symbols, name), Some(MatchKind::Global))
        }
        Some(receiver) => {
            let found = receiver_candidates(symbols, file, call, receiver);
            if !found.is_empty() {
                return (found, Some(MatchKind::Receiver));
            }
            (global_qualified(symbols, name), Some(MatchKind::Global))
        }
    }
}

/// Walk the scope chain innermost first. Enclosing class bodies are not
/// part of the chain.
fn lexical(file: &FileSymbols, scope: ScopeId, name: &str) -> Option<NodeId> {
    for (depth, s) in file.tree.ancestors(scope).enumerate() {
        if depth > 0 && s.kind == ScopeKind::Class {
            continue;
        }
        if let Some(id) = file.definition_in(s.id, name) {
            return Some(id);
        }
        if let Some(ctor) = file
            .class_in(s.id, name)
            .and_then(|class| file.constructor(class))
        {
            return Some(ctor);
        }
    }
    None
}

fn receiver_candidates(
    symbols: &SymbolTable,
    file: &FileSymbols,
    call: &ScopedCall,
    receiver: &Receiver,
) -> Vec<NodeId> {
    let name = call.site.name.as_str();
    match receiver {
        Receiver::SelfRef => file
            .tree
            .enclosing_class(call.scope)
            .and_then(|class| symbols.method(file.index, class, name))
            .into_iter()
            .collect(),
        Receiver::Constructed(class_name) => {
            methods_of(symbols, file, call.scope, class_name, name)
        }
        Receiver::Path(path) => {
            if let [var] = path.as_slice() {
                let line = call.site.line_span.start.line;
                if let Some(class_name) = bound_class(file, call.scope, var, line) {
                    let found = methods_of(symbols, file, call.scope, class_name, name);
                    if !found.is_empty() {
                        return found;
                    }
                }
            }
            let Some(last) = path.last() else {
                return Vec::new();
            };
            let found = methods_of(symbols, file, call.scope, last, name);
            if !found.is_empty() {
                return found;
            }
            module_members(symbols, last, name)
        }
        Receiver::Dynamic => Vec::new(),
    }
}

/// Class a single-assignment binding gives `var`, searched innermost first.
fn bound_class<'f>(
    file: &'f FileSymbols,
    scope: ScopeId,
    var: &str,
    line: usize,
) -> Option<&'f str> {
    for (depth, s) in file.tree.ancestors(scope).enumerate() {
        if depth > 0 && s.kind == ScopeKind::Class {
            continue;
        }
        let matching: Vec<_> = s.bindings.iter().filter(|b| b.name == var).collect();
        // Prefer the latest assignment before the call
        let chosen = matching
            .iter()
            .rev()
            .find(|b| b.line <= line)
            .or(matching.last())
            .copied();
        if let Some(binding) = chosen {
            return Some(binding.class_name.as_str());
        }
    }
    None
}

/// Method `method` on every class named `class_name`, lexical classes first.
fn methods_of(
    symbols: &SymbolTable,
    file: &FileSymbols,
    scope: ScopeId,
    class_name: &str,
    method: &str,
) -> Vec<NodeId> {
    let lexical_class = file
        .tree
        .ancestors(scope)
        .find_map(|s| file.class_in(s.id, class_name));
    if let Some(class) = lexical_class {
        return symbols.method(file.index, class, method).into_iter().collect();
    }
    symbols
        .classes_named(class_name)
        .iter()
        .filter_map(|&(index, class)| symbols.method(index, class, method))
        .collect()
}

/// `stem.name()`: a top-level function or class constructor of module `stem`.
fn module_members(symbols: &SymbolTable, stem: &str, name: &str) -> Vec<NodeId> {
    symbols
        .files_with_stem(stem)
        .iter()
        .filter_map(|&index| {
            let module = symbols.file(index);
            module.top_level(name).or_else(|| {
                module
                    .class_in(module.tree.root(), name)
                    .and_then(|class| module.constructor(class))
            })
        })
        .collect()
}

/// Top-level functions and class constructors named `name`, in any file.
fn global_unqualified(symbols: &SymbolTable, name: &str) -> Vec<NodeId> {
    let mut found: Vec<NodeId> = symbols
        .named(name)
        .iter()
        .copied()
        .filter(|&id| {
            symbols.definition(id).is_some_and(|d| {
                let file = symbols.file(d.file_index);
                d.scope == file.tree.root()
            })
        })
        .collect();
    found.extend(constructors_named(symbols, name));
    found
}

/// Every definition whose local name is `name`, plus constructors of
/// classes named `name`.
fn global_qualified(symbols: &SymbolTable, name: &str) -> Vec<NodeId> {
    let mut found = symbols.named(name).to_vec();
    found.extend(constructors_named(symbols, name));
    found
}

fn constructors_named(symbols: &SymbolTable, name: &str) -> Vec<NodeId> {
    symbols
        .classes_named(name)
        .iter()
        .filter_map(|&(index, class)| symbols.file(index).constructor(class))
        .collect()
}
