use tree_sitter::{Node, Parser, Tree};

use crate::model::{
    Binding, CallSite, Language, LineSpan, Position, Receiver, ScopeId, ScopeKind, ScopeTree,
    SourceFile, Span,
};

use super::{check_syntax, LanguageParser, ParseError};

/// Source adapter for JavaScript and TypeScript.
#[derive(Default)]
pub struct JavaScriptParser {
    // We create parsers per-call since tree_sitter::Parser is not Sync
}

impl JavaScriptParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_parser(source: &SourceFile) -> Result<Parser, ParseError> {
        let mut parser = Parser::new();
        let is_tsx = source
            .path
            .extension()
            .is_some_and(|ext| ext == "tsx");
        let grammar = match source.language {
            Language::TypeScript if is_tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            _ => tree_sitter_javascript::LANGUAGE.into(),
        };
        parser.set_language(&grammar).map_err(|e| ParseError {
            line: 0,
            message: format!("failed to load {} grammar: {}", source.language, e),
        })?;
        Ok(parser)
    }
}

impl LanguageParser for JavaScriptParser {
    fn parse(&self, source: &SourceFile) -> Result<ScopeTree, ParseError> {
        let mut parser = Self::create_parser(source)?;
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
        &[Language::JavaScript, Language::TypeScript]
    }
}

/// Walks a tree-sitter CST and builds the file's scope tree.
struct Extractor<'a> {
    source: &'a str,
    tree: &'a Tree,
    scopes: ScopeTree,
    /// Stack of open scopes for tracking nesting.
    scope_stack: Vec<ScopeId>,
    /// Class bodies and object literals whose members are declared, as
    /// (node id, is class). Members of any other container are transparent.
    member_containers: Vec<(usize, bool)>,
}

impl<'a> Extractor<'a> {
    fn new(source: &'a SourceFile, tree: &'a Tree) -> Self {
        let scopes = ScopeTree::new(source, node_line_span(tree.root_node()));
        let root = scopes.root();
        Self {
            source: &source.text,
            tree,
            scopes,
            scope_stack: vec![root],
            member_containers: Vec::new(),
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
            "function_declaration" | "generator_function_declaration" => {
                self.extract_function(node);
            }
            "class_declaration" | "abstract_class_declaration" | "class" => {
                self.extract_class(node);
            }
            "method_definition" => {
                self.extract_method(node);
            }
            "public_field_definition" | "field_definition" => {
                self.extract_field(node);
            }
            "variable_declarator" => {
                self.extract_variable_declarator(node);
            }
            "pair" => {
                self.extract_pair(node);
            }
            "call_expression" => {
                self.extract_call(node);
                // Still visit children for nested calls
                self.visit_children(node);
            }
            "new_expression" => {
                self.extract_new(node);
                self.visit_children(node);
            }
            "assignment_expression" => {
                self.extract_assignment(node);
                self.visit_children(node);
            }
            _ => {
                self.visit_children(node);
            }
        }
    }

    /// Declare `name` in the current scope and walk `function`'s body inside it.
    fn enter_definition(&mut self, name: &str, decl: Node, function: Node, is_constructor: bool) {
        let scope = self.current_scope();
        let body = self.scopes.add_definition(
            scope,
            name,
            node_span(decl),
            node_line_span(decl),
            is_constructor,
        );

        // Default parameter values are evaluated in the defining scope
        if let Some(params) = function.child_by_field_name("parameters") {
            self.visit_children(params);
        }

        self.scope_stack.push(body);
        if let Some(body_node) = function.child_by_field_name("body") {
            // Arrow functions may have an expression body
            self.visit_node(body_node);
        }
        self.scope_stack.pop();
    }

    fn extract_function(&mut self, node: Node) {
        match node.child_by_field_name("name") {
            Some(n) => {
                let name = self.node_text(n);
                self.enter_definition(name, node, node, false);
            }
            // `export default function () {}`
            None => self.visit_children(node),
        }
    }

    fn extract_class(&mut self, node: Node) {
        match node.child_by_field_name("name") {
            Some(n) => {
                let name = self.node_text(n);
                self.open_class(node, name);
            }
            // Unbound class expressions are transparent like callbacks
            None => self.visit_children(node),
        }
    }

    fn open_class(&mut self, node: Node, name: &str) {
        let parent = self.current_scope();
        let class_scope =
            self.scopes
                .add_scope(parent, ScopeKind::Class, name, node_line_span(node));

        if let Some(body) = node.child_by_field_name("body") {
            self.scope_stack.push(class_scope);
            self.member_containers.push((body.id(), true));
            self.visit_children(body);
            self.member_containers.pop();
            self.scope_stack.pop();
        }
    }

    /// Object literal bound to a name: `const api = { list() {} }`.
    fn open_object(&mut self, node: Node, name: &str) {
        let parent = self.current_scope();
        let object_scope =
            self.scopes
                .add_scope(parent, ScopeKind::Class, name, node_line_span(node));

        self.scope_stack.push(object_scope);
        self.member_containers.push((node.id(), false));
        self.visit_children(node);
        self.member_containers.pop();
        self.scope_stack.pop();
    }

    /// Whether `member` sits directly in the innermost declaring container.
    /// Returns `Some(is_class)` if so.
    fn declaring_container(&self, member: Node) -> Option<bool> {
        let parent = member.parent()?;
        match self.member_containers.last() {
            Some(&(id, is_class)) if id == parent.id() => Some(is_class),
            _ => None,
        }
    }

    /// Walk a function's parameters and body without declaring it.
    fn visit_transparent(&mut self, function: Node) {
        if let Some(params) = function.child_by_field_name("parameters") {
            self.visit_children(params);
        }
        if let Some(body) = function.child_by_field_name("body") {
            self.visit_node(body);
        }
    }

    fn extract_method(&mut self, node: Node) {
        let name = match node.child_by_field_name("name") {
            Some(n) => self.node_text(n),
            None => return self.visit_children(node),
        };
        match self.declaring_container(node) {
            Some(is_class) => {
                let is_constructor = is_class && name == "constructor";
                self.enter_definition(name, node, node, is_constructor);
            }
            None => self.visit_transparent(node),
        }
    }

    /// `key: value` inside a declared object literal.
    fn extract_pair(&mut self, node: Node) {
        let key = node
            .child_by_field_name("key")
            .and_then(|k| self.property_name(k));
        let value = node.child_by_field_name("value");
        let (key, value) = match (key, value) {
            (Some(k), Some(v)) if self.declaring_container(node).is_some() => (k, v),
            _ => return self.visit_children(node),
        };

        match value.kind() {
            "object" => self.open_object(value, key),
            "class" if value.child_by_field_name("name").is_none() => {
                self.open_class(value, key)
            }
            _ if is_function_node(value) => self.enter_definition(key, node, value, false),
            _ => self.visit_node(value),
        }
    }

    fn property_name(&self, key: Node) -> Option<&'a str> {
        match key.kind() {
            "property_identifier" | "identifier" => Some(self.node_text(key)),
            "string" => Some(
                self.node_text(key)
                    .trim_matches(|c| matches!(c, '"' | '\'' | '`')),
            ),
            _ => None,
        }
    }

    /// Class fields holding functions: `handle = () => { ... }`.
    fn extract_field(&mut self, node: Node) {
        let name_node = node
            .child_by_field_name("name")
            .or_else(|| node.child_by_field_name("property"));
        let value = node.child_by_field_name("value");
        let declared = self.declaring_container(node).is_some();
        match (name_node, value) {
            (Some(name_node), Some(value)) if declared && is_function_node(value) => {
                let name = self.node_text(name_node);
                self.enter_definition(name, node, value, false);
            }
            (Some(_), Some(value)) if !declared && is_function_node(value) => {
                self.visit_transparent(value)
            }
            _ => self.visit_children(node),
        }
    }

    fn extract_variable_declarator(&mut self, node: Node) {
        let name_node = node.child_by_field_name("name");
        let value = node.child_by_field_name("value");

        let (name_node, value) = match (name_node, value) {
            (Some(n), Some(v)) if n.kind() == "identifier" => (n, v),
            _ => return self.visit_children(node),
        };
        let name = self.node_text(name_node);

        if is_function_node(value) {
            self.enter_definition(name, node, value, false);
            return;
        }
        match value.kind() {
            "object" => return self.open_object(value, name),
            "class" if value.child_by_field_name("name").is_none() => {
                return self.open_class(value, name)
            }
            _ => {}
        }

        if let Some(class_name) = self.constructed_name(value) {
            self.push_binding(name, class_name, name_node);
        }
        // Don't treat the variable as a scope: references in the value
        // belong to the enclosing function
        self.visit_node(value);
    }

    fn extract_assignment(&mut self, node: Node) {
        let (left, right) = match (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) {
            (Some(l), Some(r)) => (l, r),
            _ => return,
        };
        if left.kind() != "identifier" {
            return;
        }
        if let Some(class_name) = self.constructed_name(right) {
            self.push_binding(self.node_text(left), class_name, left);
        }
    }

    fn push_binding(&mut self, name: &str, class_name: String, at: Node) {
        let binding = Binding {
            name: name.to_string(),
            class_name,
            line: at.start_position().row + 1,
        };
        let scope = self.current_scope();
        self.scopes.scope_mut(scope).bindings.push(binding);
    }

    /// `Foo` for `new Foo()`, `Foo()`, `ns.Foo()`, `await new Foo()`.
    fn constructed_name(&self, value: Node) -> Option<String> {
        match value.kind() {
            "new_expression" => {
                let ctor = value.child_by_field_name("constructor")?;
                self.trailing_name(ctor)
            }
            "call_expression" => {
                let func = value.child_by_field_name("function")?;
                self.trailing_name(func)
            }
            "await_expression" | "parenthesized_expression" => {
                self.constructed_name(value.named_child(0)?)
            }
            _ => None,
        }
    }

    fn trailing_name(&self, node: Node) -> Option<String> {
        match node.kind() {
            "identifier" => Some(self.node_text(node).to_string()),
            "member_expression" => node
                .child_by_field_name("property")
                .map(|p| self.node_text(p).to_string()),
            _ => None,
        }
    }

    fn extract_call(&mut self, node: Node) {
        let func = match node.child_by_field_name("function") {
            Some(f) => f,
            None => return,
        };
        let (name, receiver) = match func.kind() {
            "identifier" => (self.node_text(func).to_string(), None),
            "member_expression" => {
                let property = match func.child_by_field_name("property") {
                    Some(p) => self.node_text(p).to_string(),
                    None => return,
                };
                let receiver = func
                    .child_by_field_name("object")
                    .map(|object| self.receiver_of(object))
                    .unwrap_or(Receiver::Dynamic);
                (property, Some(receiver))
            }
            // super(...), import(...), iife's and computed callees
            _ => return,
        };
        self.push_call(name, receiver, func);
    }

    fn extract_new(&mut self, node: Node) {
        // new ClassName(...)
        let ctor = match node.child_by_field_name("constructor") {
            Some(c) => c,
            None => return,
        };
        let (name, receiver) = match ctor.kind() {
            "identifier" => (self.node_text(ctor).to_string(), None),
            "member_expression" => {
                let property = match ctor.child_by_field_name("property") {
                    Some(p) => self.node_text(p).to_string(),
                    None => return,
                };
                let receiver = ctor
                    .child_by_field_name("object")
                    .map(|object| self.receiver_of(object))
                    .unwrap_or(Receiver::Dynamic);
                (property, Some(receiver))
            }
            _ => return,
        };
        self.push_call(name, receiver, ctor);
    }

    fn push_call(&mut self, name: String, receiver: Option<Receiver>, callee: Node) {
        let call = CallSite {
            name,
            receiver,
            text: compact_text(self.node_text(callee)),
            span: node_span(callee),
            line_span: node_line_span(callee),
        };
        let scope = self.current_scope();
        self.scopes.scope_mut(scope).calls.push(call);
    }

    fn receiver_of(&self, object: Node) -> Receiver {
        match object.kind() {
            "this" => Receiver::SelfRef,
            "identifier" => Receiver::Path(vec![self.node_text(object).to_string()]),
            "member_expression" => self
                .member_path(object)
                .map(Receiver::Path)
                .unwrap_or(Receiver::Dynamic),
            "call_expression" | "new_expression" => self
                .constructed_name(object)
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
    fn member_path(&self, node: Node) -> Option<Vec<String>> {
        match node.kind() {
            "identifier" | "this" => Some(vec![self.node_text(node).to_string()]),
            "member_expression" => {
                let mut path = self.member_path(node.child_by_field_name("object")?)?;
                path.push(self.node_text(node.child_by_field_name("property")?).to_string());
                Some(path)
            }
            _ => None,
        }
    }
}

fn is_function_node(node: Node) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
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
