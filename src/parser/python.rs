use tree_sitter::{Node, Parser, Tree};

use crate::model::{
    Binding, CallSite, Language, LineSpan, Position, Receiver, ScopeId, ScopeKind, ScopeTree,
    SourceFile, Span, TaskRegistration,
};

use super::{check_syntax, LanguageParser, ParseError};

#[derive(Default)]
pub struct PythonParser {
    // Parsers are created per call since tree_sitter::Parser is not Sync
}

impl PythonParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_parser() -> Result<Parser, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ParseError {
                line: 0,
                message: format!("failed to load python grammar: {}", e),
            })?;
        Ok(parser)
    }
}

impl LanguageParser for PythonParser {
    fn parse(&self, source: &SourceFile) -> Result<ScopeTree, ParseError> {
        let mut parser = Self::create_parser()?;
        let tree = parser.parse(&source.text, None).ok_or_else(|| ParseError {
            line: 0,
            message: "tree-sitter failed to parse".to_string(),
        })?;
        check_syntax(&tree)?;

        let mut extractor = Extractor::new(source, &tree);
        extractor.extract();
        Ok(extractor.scopes)
    }

    fn supported_languages(&self) -> &[Language] {
        &[Language::Python]
    }
}

/// Walks a tree-sitter CST and builds the file's scope tree.
struct Extractor<'a> {
    source: &'a str,
    tree: &'a Tree,
    scopes: ScopeTree,
    /// Innermost scope last.
    scope_stack: Vec<ScopeId>,
}

impl<'a> Extractor<'a> {
    fn new(source: &'a SourceFile, tree: &'a Tree) -> Self {
        let root_span = node_line_span(tree.root_node());
        let scopes = ScopeTree::new(source, root_span);
        let root = scopes.root();
        Self {
            source: &source.text,
            tree,
            scopes,
            scope_stack: vec![root],
        }
    }

    fn node_text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn current_scope(&self) -> ScopeId {
        self.scope_stack
            .last()
            .copied()
            .unwrap_or_else(|| self.scopes.root())
    }

    fn extract(&mut self) {
        let root = self.tree.root_node();
        self.visit_children(root);
    }

    fn visit_children(&mut self, node: Node) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit_node(child);
        }
    }

    fn visit_node(&mut self, node: Node) {
        match node.kind() {
            "function_definition" => self.extract_function(node),
            "class_definition" => self.extract_class(node),
            "call" => {
                self.extract_call(node);
                // Arguments and chained receivers may hold further calls
                self.visit_children(node);
            }
            "assignment" => {
                self.extract_binding(node);
                self.visit_children(node);
            }
            // Decorators, if/try/with blocks and the like are transparent:
            // whatever they contain belongs to the current scope.
            _ => self.visit_children(node),
        }
    }

    fn extract_function(&mut self, node: Node) {
        let name = match node.child_by_field_name("name") {
            Some(n) => self.node_text(n).to_string(),
            None => return self.visit_children(node),
        };

        let scope = self.current_scope();
        let in_class = self.scopes.scope(scope).kind == ScopeKind::Class;
        let is_constructor = in_class && matches!(name.as_str(), "__init__" | "__new__");

        let body = self.scopes.add_definition(
            scope,
            &name,
            node_span(node),
            node_line_span(node),
            is_constructor,
        );

        // Default values are evaluated where the function is defined
        if let Some(params) = node.child_by_field_name("parameters") {
            self.visit_children(params);
        }

        self.scope_stack.push(body);
        if let Some(block) = node.child_by_field_name("body") {
            if name == "start" {
                self.collect_registrations(block);
            }
            self.visit_children(block);
        }
        self.scope_stack.pop();
    }

    /// Record every `register` call anywhere under a `start()` body.
    fn collect_registrations(&mut self, node: Node) {
        if node.kind() == "call" {
            if let Some(name) = self.registered_task(node) {
                self.scopes.registrations.push(TaskRegistration {
                    name,
                    line: node.start_position().row + 1,
                });
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.collect_registrations(child);
        }
    }

    /// `Task.register(cc)` registers the class `Task`;
    /// `cc.register(name, data, executor)` registers the function `executor`.
    fn registered_task(&self, call: Node) -> Option<String> {
        let func = call.child_by_field_name("function")?;
        if func.kind() != "attribute"
            || self.node_text(func.child_by_field_name("attribute")?) != "register"
        {
            return None;
        }

        let args = call.child_by_field_name("arguments")?;
        let mut cursor = args.walk();
        let positional: Vec<Node> = args
            .named_children(&mut cursor)
            .filter(|a| !matches!(a.kind(), "keyword_argument" | "comment"))
            .collect();

        match positional.as_slice() {
            [client] => {
                let is_client = client.kind() == "identifier"
                    && matches!(self.node_text(*client), "cc" | "conductor");
                let object = func.child_by_field_name("object")?;
                (is_client && object.kind() == "identifier")
                    .then(|| self.node_text(object).to_string())
            }
            [_, _, executor, ..] if executor.kind() == "identifier" => {
                Some(self.node_text(*executor).to_string())
            }
            _ => None,
        }
    }

    fn extract_class(&mut self, node: Node) {
        let name = match node.child_by_field_name("name") {
            Some(n) => self.node_text(n).to_string(),
            None => return self.visit_children(node),
        };

        if let Some(bases) = node.child_by_field_name("superclasses") {
            self.visit_children(bases);
        }

        let parent = self.current_scope();
        let class_scope = self.scopes.add_scope(
            parent,
            ScopeKind::Class,
            &name,
            node_line_span(node),
        );
        self.scope_stack.push(class_scope);
        if let Some(block) = node.child_by_field_name("body") {
            self.visit_children(block);
        }
        self.scope_stack.pop();
    }

    fn extract_call(&mut self, node: Node) {
        let func = match node.child_by_field_name("function") {
            Some(f) => f,
            None => return,
        };

        let (name, receiver) = match func.kind() {
            "identifier" => (self.node_text(func).to_string(), None),
            "attribute" => {
                let attr = match func.child_by_field_name("attribute") {
                    Some(a) => self.node_text(a).to_string(),
                    None => return,
                };
                let receiver = func
                    .child_by_field_name("object")
                    .map(|object| self.receiver_of(object))
                    .unwrap_or(Receiver::Dynamic);
                (attr, Some(receiver))
            }
            // `handlers[key]()`, `make()()`: no name to match against
            _ => return,
        };

        let call = CallSite {
            name,
            receiver,
            text: compact_text(self.node_text(func)),
            span: node_span(func),
            line_span: node_line_span(func),
        };
        let scope = self.current_scope();
        self.scopes.scope_mut(scope).calls.push(call);
    }

    fn receiver_of(&self, object: Node) -> Receiver {
        match object.kind() {
            "identifier" => match self.node_text(object) {
                "self" | "cls" => Receiver::SelfRef,
                name => Receiver::Path(vec![name.to_string()]),
            },
            "attribute" => self
                .attribute_path(object)
                .map(Receiver::Path)
                .unwrap_or(Receiver::Dynamic),
            "call" => self
                .callee_name(object)
                .map(Receiver::Constructed)
                .unwrap_or(Receiver::Dynamic),
            "parenthesized_expression" => object
                .named_child(0)
                .map(|inner| self.receiver_of(inner))
                .unwrap_or(Receiver::Dynamic),
            _ => Receiver::Dynamic,
        }
    }

    /// `a.b.c` as `["a", "b", "c"]`, if every link is a plain name.
    fn attribute_path(&self, node: Node) -> Option<Vec<String>> {
        match node.kind() {
            "identifier" => Some(vec![self.node_text(node).to_string()]),
            "attribute" => {
                let mut path = self.attribute_path(node.child_by_field_name("object")?)?;
                path.push(self.node_text(node.child_by_field_name("attribute")?).to_string());
                Some(path)
            }
            _ => None,
        }
    }

    /// Trailing name of a call's function: `Foo` for `Foo()` and `mod.Foo()`.
    fn callee_name(&self, call: Node) -> Option<String> {
        let func = call.child_by_field_name("function")?;
        match func.kind() {
            "identifier" => Some(self.node_text(func).to_string()),
            "attribute" => func
                .child_by_field_name("attribute")
                .map(|a| self.node_text(a).to_string()),
            _ => None,
        }
    }

    /// Record `name = Something(...)` so `name.method()` can be traced.
    fn extract_binding(&mut self, node: Node) {
        let (left, right) = match (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) {
            (Some(l), Some(r)) => (l, r),
            _ => return,
        };
        if left.kind() != "identifier" || right.kind() != "call" {
            return;
        }
        if let Some(class_name) = self.callee_name(right) {
            let binding = Binding {
                name: self.node_text(left).to_string(),
                class_name,
                line: left.start_position().row + 1,
            };
            let scope = self.current_scope();
            self.scopes.scope_mut(scope).bindings.push(binding);
        }
    }
}

fn node_span(node: Node) -> Span {
    Span {
        start: node.start_byte(),
        end: node.end_byte(),
    }
}

fn node_line_span(node: Node) -> LineSpan {
    let start = node.start_position();
    let end = node.end_position();
    LineSpan {
        start: Position {
            line: start.row + 1,
            column: start.column,
        },
        end: Position {
            line: end.row + 1,
            column: end.column,
        },
    }
}

fn compact_text(text: &str) -> String {
    text.split_whitespace().collect()
}
