//! Python source model.
//!
//! Turns one Python file into a flat list of [`Definition`]s (classes,
//! functions, methods) plus the call sites, assignments and import bindings
//! the resolver works from. Parsing is done with tree-sitter; a file whose
//! tree contains ERROR or MISSING nodes is rejected as a whole.
use crate::errors::ParseError;
use std::path::Path;
use tree_sitter::{Node, Parser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Class,
    Function,
    Method,
}

/// The small expression subset that matters for call resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Name(String),
    Attribute { base: Box<Expr>, attr: String },
    Call(Box<Expr>),
    Other,
}

impl Expr {
    /// Build `a.b.c` into nested attribute accesses.
    #[must_use]
    pub fn dotted(path: &str) -> Self {
        let mut parts = path.split('.').filter(|p| !p.is_empty());
        let Some(first) = parts.next() else { return Expr::Other };
        parts.fold(Expr::Name(first.to_string()), |base, attr| Expr::Attribute {
            base: Box::new(base),
            attr: attr.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `f()`
    BareName,
    /// `obj.f()`, `module.f()`, `Cls().f()`
    Attribute,
    /// `self.f()` / `cls.f()` inside a method
    SelfMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Callee expression as written, whitespace stripped.
    pub callee_text: String,
    pub callee: Expr,
    pub kind: CallKind,
    /// Bare name being called (last segment of the callee).
    pub name: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignTarget {
    Name(String),
    /// `self.<attr> = ...` recorded on the owning class.
    SelfAttr(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub target: AssignTarget,
    pub value: Expr,
    pub annotation: Option<Expr>,
    /// Definition whose body contains the statement; `None` at module level.
    pub scope: Option<usize>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    Module(String),
    Symbol { module: String, name: String },
    Wildcard(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub local: String,
    pub target: ImportTarget,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct Definition {
    pub kind: DefinitionKind,
    pub name: String,
    /// Dotted within the file, e.g. `Service.run` or `outer.inner`.
    pub qualified_name: String,
    pub parent: Option<usize>,
    /// Owning class for methods.
    pub class_scope: Option<usize>,
    pub bases: Vec<Expr>,
    pub first_param: Option<String>,
    pub line_start: usize,
    pub line_end: usize,
    pub calls: Vec<CallSite>,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone)]
pub struct ParsedFile {
    /// Root-relative path with `/` separators.
    pub rel_path: String,
    /// Dotted module name (`utils/c.py` -> `utils.c`, `pkg/__init__.py` -> `pkg`).
    pub module: String,
    pub is_package: bool,
    pub line_count: usize,
    pub definitions: Vec<Definition>,
    pub imports: Vec<ImportBinding>,
    pub module_calls: Vec<CallSite>,
    pub module_assignments: Vec<Assignment>,
}

/// Map a root-relative path to its dotted module name and package flag.
#[must_use]
pub fn module_name_for(rel_path: &str) -> (String, bool) {
    let trimmed = rel_path.strip_suffix(".py").unwrap_or(rel_path);
    let mut parts: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    let is_package = parts.last() == Some(&"__init__");
    if is_package {
        parts.pop();
    }
    (parts.join("."), is_package)
}

/// Join two dotted module names, tolerating an empty prefix.
#[must_use]
pub fn join_module(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn relative_module(package: &str, level: usize, tail: &str) -> String {
    let mut parts: Vec<&str> = package.split('.').filter(|s| !s.is_empty()).collect();
    for _ in 1..level {
        parts.pop();
    }
    parts.extend(tail.split('.').filter(|s| !s.is_empty()));
    parts.join(".")
}

pub struct PythonParser {
    parser: Parser,
}

impl std::fmt::Debug for PythonParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PythonParser").finish_non_exhaustive()
    }
}

impl PythonParser {
    /// # Errors
    /// Returns `ParseError::Language` if the bundled grammar is incompatible
    /// with the linked tree-sitter runtime.
    pub fn new() -> Result<Self, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ParseError::Language(e.to_string()))?;
        Ok(Self { parser })
    }

    /// Read and parse a file from disk.
    ///
    /// # Errors
    /// I/O failures, invalid UTF-8, and syntax errors are all reported per file.
    pub fn parse_path(&mut self, path: &Path, rel_path: &str) -> Result<ParsedFile, ParseError> {
        let bytes = std::fs::read(path)?;
        let content = String::from_utf8(bytes)
            .map_err(|_| ParseError::InvalidUtf8 { file: path.to_path_buf() })?;
        self.parse_source(&content, rel_path)
    }

    /// Parse in-memory source as if it lived at `rel_path`.
    ///
    /// # Errors
    /// Returns `ParseError::Syntax` when the tree contains error nodes.
    pub fn parse_source(&mut self, content: &str, rel_path: &str) -> Result<ParsedFile, ParseError> {
        let tree = self
            .parser
            .parse(content, None)
            .ok_or_else(|| ParseError::NoTree { file: rel_path.into() })?;
        let root = tree.root_node();
        if root.has_error() {
            let at = first_error(root).unwrap_or(root).start_position();
            return Err(ParseError::Syntax {
                file: rel_path.into(),
                line: at.row + 1,
                column: at.column + 1,
            });
        }

        let (module, is_package) = module_name_for(rel_path);
        let package = if is_package {
            module.clone()
        } else {
            module.rsplit_once('.').map(|(p, _)| p.to_string()).unwrap_or_default()
        };
        let mut extractor = Extractor {
            src: content.as_bytes(),
            package,
            definitions: Vec::new(),
            imports: Vec::new(),
            module_calls: Vec::new(),
            module_assignments: Vec::new(),
        };
        extractor.walk(root, None);

        Ok(ParsedFile {
            rel_path: rel_path.to_string(),
            module,
            is_package,
            line_count: content.lines().count(),
            definitions: extractor.definitions,
            imports: extractor.imports,
            module_calls: extractor.module_calls,
            module_assignments: extractor.module_assignments,
        })
    }
}

fn first_error<'t>(node: Node<'t>) -> Option<Node<'t>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

struct Extractor<'s> {
    src: &'s [u8],
    package: String,
    definitions: Vec<Definition>,
    imports: Vec<ImportBinding>,
    module_calls: Vec<CallSite>,
    module_assignments: Vec<Assignment>,
}

impl<'s> Extractor<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        node.utf8_text(self.src).unwrap_or("")
    }

    fn walk(&mut self, node: Node<'_>, scope: Option<usize>) {
        match node.kind() {
            "function_definition" => {
                self.visit_function(node, node, scope);
                return;
            }
            "class_definition" => {
                self.visit_class(node, node, scope);
                return;
            }
            "decorated_definition" => {
                let mut cursor = node.walk();
                for decorator in node.named_children(&mut cursor).filter(|c| c.kind() == "decorator") {
                    self.walk(decorator, scope);
                }
                if let Some(def) = node.child_by_field_name("definition") {
                    match def.kind() {
                        "function_definition" => self.visit_function(def, node, scope),
                        "class_definition" => self.visit_class(def, node, scope),
                        _ => {}
                    }
                }
                return;
            }
            "import_statement" => {
                self.record_import(node);
                return;
            }
            "import_from_statement" => {
                self.record_from_import(node);
                return;
            }
            "call" => self.record_call(node, scope),
            "assignment" => self.record_assignment(node, scope),
            "for_statement" | "for_in_clause" => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.bind_targets(left, scope);
                }
            }
            "as_pattern" => {
                if let Some(alias) = node.child_by_field_name("alias") {
                    self.bind_targets(alias, scope);
                }
            }
            "except_clause" => self.record_except_alias(node, scope),
            "named_expression" => self.record_named_expression(node, scope),
            _ => {}
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.walk(child, scope);
        }
    }

    fn qualify(&self, scope: Option<usize>, name: &str) -> String {
        match scope {
            Some(i) => format!("{}.{name}", self.definitions[i].qualified_name),
            None => name.to_string(),
        }
    }

    fn visit_function(&mut self, def: Node<'_>, outer: Node<'_>, scope: Option<usize>) {
        let Some(name_node) = def.child_by_field_name("name") else { return };
        let name = self.text(name_node).to_string();
        let (kind, class_scope) = match scope {
            Some(i) if self.definitions[i].kind == DefinitionKind::Class => {
                (DefinitionKind::Method, Some(i))
            }
            _ => (DefinitionKind::Function, None),
        };
        let index = self.definitions.len();
        self.definitions.push(Definition {
            kind,
            qualified_name: self.qualify(scope, &name),
            name,
            parent: scope,
            class_scope,
            bases: Vec::new(),
            first_param: None,
            line_start: line_of(outer),
            line_end: outer.end_position().row + 1,
            calls: Vec::new(),
            assignments: Vec::new(),
        });
        if let Some(params) = def.child_by_field_name("parameters") {
            self.record_parameters(params, index, scope);
        }
        if let Some(body) = def.child_by_field_name("body") {
            self.walk(body, Some(index));
        }
    }

    fn visit_class(&mut self, def: Node<'_>, outer: Node<'_>, scope: Option<usize>) {
        let Some(name_node) = def.child_by_field_name("name") else { return };
        let name = self.text(name_node).to_string();
        let bases = match def.child_by_field_name("superclasses") {
            Some(args) => {
                let mut cursor = args.walk();
                let nodes: Vec<Node<'_>> = args
                    .named_children(&mut cursor)
                    .filter(|c| c.kind() != "keyword_argument")
                    .collect();
                nodes.into_iter().map(|n| self.expr(n)).collect()
            }
            None => Vec::new(),
        };
        let index = self.definitions.len();
        self.definitions.push(Definition {
            kind: DefinitionKind::Class,
            qualified_name: self.qualify(scope, &name),
            name,
            parent: scope,
            class_scope: None,
            bases,
            first_param: None,
            line_start: line_of(outer),
            line_end: outer.end_position().row + 1,
            calls: Vec::new(),
            assignments: Vec::new(),
        });
        if let Some(body) = def.child_by_field_name("body") {
            self.walk(body, Some(index));
        }
    }

    fn record_parameters(&mut self, params: Node<'_>, index: usize, outer_scope: Option<usize>) {
        let mut cursor = params.walk();
        let nodes: Vec<Node<'_>> = params.named_children(&mut cursor).collect();
        for (position, param) in nodes.into_iter().enumerate() {
            let (name, annotation, default) = match param.kind() {
                "identifier" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                    (self.param_name(param), None, None)
                }
                "typed_parameter" => {
                    let mut c = param.walk();
                    let name = param.named_children(&mut c).next().and_then(|n| self.param_name(n));
                    (name, param.child_by_field_name("type"), None)
                }
                "default_parameter" | "typed_default_parameter" => (
                    param.child_by_field_name("name").and_then(|n| self.param_name(n)),
                    param.child_by_field_name("type"),
                    param.child_by_field_name("value"),
                ),
                _ => (None, None, None),
            };
            let splat = matches!(param.kind(), "list_splat_pattern" | "dictionary_splat_pattern")
                || param.named_child(0).is_some_and(|n| n.kind() != "identifier");
            if position == 0 && !splat {
                self.definitions[index].first_param.clone_from(&name);
            }
            if let Some(value) = default {
                self.walk(value, outer_scope);
            }
            // every parameter shadows outer bindings, typed or not
            if let Some(name) = name {
                let annotation = annotation.map(|ty| self.expr(ty));
                self.definitions[index].assignments.push(Assignment {
                    target: AssignTarget::Name(name),
                    value: Expr::Other,
                    annotation,
                    scope: Some(index),
                    line: line_of(param),
                });
            }
        }
    }

    /// `x`, `*args`, `**kwargs`.
    fn param_name(&self, node: Node<'_>) -> Option<String> {
        match node.kind() {
            "identifier" => Some(self.text(node).to_string()),
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                let mut cursor = node.walk();
                let inner = node.named_children(&mut cursor).find(|n| n.kind() == "identifier");
                inner.map(|n| self.text(n).to_string())
            }
            _ => None,
        }
    }

    /// Nearest enclosing method, stopping at a class body.
    fn enclosing_method(&self, scope: Option<usize>) -> Option<usize> {
        let mut cur = scope;
        while let Some(i) = cur {
            match self.definitions[i].kind {
                DefinitionKind::Method => return Some(i),
                DefinitionKind::Class => return None,
                DefinitionKind::Function => cur = self.definitions[i].parent,
            }
        }
        None
    }

    fn is_self_receiver(&self, scope: Option<usize>, name: &str) -> bool {
        self.enclosing_method(scope)
            .and_then(|m| self.definitions[m].first_param.as_deref())
            .is_some_and(|p| p == name)
    }

    fn record_call(&mut self, node: Node<'_>, scope: Option<usize>) {
        let Some(function) = node.child_by_field_name("function") else { return };
        let callee = self.expr(function);
        let (kind, name) = match &callee {
            Expr::Name(n) => (CallKind::BareName, n.clone()),
            Expr::Attribute { base, attr } => {
                let on_self = matches!(base.as_ref(), Expr::Name(b) if self.is_self_receiver(scope, b));
                (if on_self { CallKind::SelfMethod } else { CallKind::Attribute }, attr.clone())
            }
            Expr::Call(_) | Expr::Other => return,
        };
        let site = CallSite {
            callee_text: self.text(function).split_whitespace().collect(),
            callee,
            kind,
            name,
            line: line_of(function),
        };
        match scope {
            Some(i) => self.definitions[i].calls.push(site),
            None => self.module_calls.push(site),
        }
    }

    fn record_assignment(&mut self, node: Node<'_>, scope: Option<usize>) {
        let Some(left) = node.child_by_field_name("left") else { return };
        let value = node.child_by_field_name("right").map_or(Expr::Other, |r| self.expr(r));
        let annotation = node.child_by_field_name("type").map(|t| self.expr(t));
        let line = line_of(node);
        match left.kind() {
            "identifier" => {
                let assignment = Assignment {
                    target: AssignTarget::Name(self.text(left).to_string()),
                    value,
                    annotation,
                    scope,
                    line,
                };
                self.push_assignment(assignment);
            }
            "attribute" => {
                let (Some(object), Some(attr)) =
                    (left.child_by_field_name("object"), left.child_by_field_name("attribute"))
                else {
                    return;
                };
                if object.kind() != "identifier" || !self.is_self_receiver(scope, self.text(object)) {
                    return;
                }
                let owner = self
                    .enclosing_method(scope)
                    .and_then(|m| self.definitions[m].class_scope);
                if let Some(class) = owner {
                    let attr_name = self.text(attr).to_string();
                    self.definitions[class].assignments.push(Assignment {
                        target: AssignTarget::SelfAttr(attr_name),
                        value,
                        annotation,
                        scope,
                        line,
                    });
                }
            }
            // `a, b = ...`, `[a, *rest] = ...`
            _ => self.bind_targets(left, scope),
        }
    }

    fn push_assignment(&mut self, assignment: Assignment) {
        match assignment.scope {
            Some(i) => self.definitions[i].assignments.push(assignment),
            None => self.module_assignments.push(assignment),
        }
    }

    /// Bind every plain name in a target pattern to an unknown value.
    fn bind_targets(&mut self, pattern: Node<'_>, scope: Option<usize>) {
        let mut names = Vec::new();
        self.pattern_names(pattern, &mut names);
        let line = line_of(pattern);
        for name in names {
            self.push_assignment(Assignment {
                target: AssignTarget::Name(name),
                value: Expr::Other,
                annotation: None,
                scope,
                line,
            });
        }
    }

    fn pattern_names(&self, node: Node<'_>, out: &mut Vec<String>) {
        match node.kind() {
            "identifier" => out.push(self.text(node).to_string()),
            "pattern_list" | "tuple_pattern" | "list_pattern" | "list_splat_pattern"
            | "dictionary_splat_pattern" | "parenthesized_expression" | "tuple" | "list" | "list_splat"
            | "as_pattern_target" => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    self.pattern_names(child, out);
                }
            }
            // attribute and subscript targets bind nothing local
            _ => {}
        }
    }

    /// `except E as e` on grammars that do not wrap it in an `as_pattern`.
    fn record_except_alias(&mut self, node: Node<'_>, scope: Option<usize>) {
        if let Some(alias) = node.child_by_field_name("alias") {
            self.bind_targets(alias, scope);
            return;
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        if let Some(pos) = children.iter().position(|c| c.kind() == "as") {
            if let Some(target) = children[pos + 1..].iter().find(|c| c.is_named()) {
                self.bind_targets(*target, scope);
            }
        }
    }

    fn record_named_expression(&mut self, node: Node<'_>, scope: Option<usize>) {
        let Some(name) = node.child_by_field_name("name") else { return };
        let value = node.child_by_field_name("value").map_or(Expr::Other, |v| self.expr(v));
        let assignment = Assignment {
            target: AssignTarget::Name(self.text(name).to_string()),
            value,
            annotation: None,
            scope,
            line: line_of(node),
        };
        self.push_assignment(assignment);
    }

    fn expr(&self, node: Node<'_>) -> Expr {
        match node.kind() {
            "identifier" => Expr::Name(self.text(node).to_string()),
            "attribute" => {
                match (node.child_by_field_name("object"), node.child_by_field_name("attribute")) {
                    (Some(object), Some(attr)) => Expr::Attribute {
                        base: Box::new(self.expr(object)),
                        attr: self.text(attr).to_string(),
                    },
                    _ => Expr::Other,
                }
            }
            "call" => node
                .child_by_field_name("function")
                .map_or(Expr::Other, |f| Expr::Call(Box::new(self.expr(f)))),
            "parenthesized_expression" | "type" => {
                let mut cursor = node.walk();
                let inner = node.named_children(&mut cursor).next();
                inner.map_or(Expr::Other, |n| self.expr(n))
            }
            // forward references: `x: "Service"`
            "string" => {
                let raw = self.text(node).trim_matches(|c| c == '"' || c == '\'');
                if !raw.is_empty() && raw.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
                    Expr::dotted(raw)
                } else {
                    Expr::Other
                }
            }
            _ => Expr::Other,
        }
    }

    fn record_import(&mut self, node: Node<'_>) {
        let line = line_of(node);
        let mut cursor = node.walk();
        let names: Vec<Node<'_>> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            match name.kind() {
                "dotted_name" => {
                    // `import a.b` binds `a`
                    let full = self.text(name);
                    let local = full.split('.').next().unwrap_or(full).to_string();
                    self.imports.push(ImportBinding {
                        target: ImportTarget::Module(local.clone()),
                        local,
                        line,
                    });
                }
                "aliased_import" => {
                    let (Some(module), Some(alias)) =
                        (name.child_by_field_name("name"), name.child_by_field_name("alias"))
                    else {
                        continue;
                    };
                    self.imports.push(ImportBinding {
                        local: self.text(alias).to_string(),
                        target: ImportTarget::Module(self.text(module).to_string()),
                        line,
                    });
                }
                _ => {}
            }
        }
    }

    fn record_from_import(&mut self, node: Node<'_>) {
        let Some(module_node) = node.child_by_field_name("module_name") else { return };
        let module = if module_node.kind() == "relative_import" {
            self.relative_import(module_node)
        } else {
            self.text(module_node).to_string()
        };
        let line = line_of(node);

        let mut cursor = node.walk();
        if node.named_children(&mut cursor).any(|c| c.kind() == "wildcard_import") {
            self.imports.push(ImportBinding {
                local: "*".to_string(),
                target: ImportTarget::Wildcard(module),
                line,
            });
            return;
        }
        let names: Vec<Node<'_>> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let (imported, local) = match name.kind() {
                "dotted_name" => (self.text(name), self.text(name)),
                "aliased_import" => {
                    let (Some(n), Some(a)) =
                        (name.child_by_field_name("name"), name.child_by_field_name("alias"))
                    else {
                        continue;
                    };
                    (self.text(n), self.text(a))
                }
                _ => continue,
            };
            self.imports.push(ImportBinding {
                local: local.to_string(),
                target: ImportTarget::Symbol { module: module.clone(), name: imported.to_string() },
                line,
            });
        }
    }

    fn relative_import(&self, node: Node<'_>) -> String {
        let mut level = 0;
        let mut tail = "";
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_prefix" => level = self.text(child).chars().filter(|c| *c == '.').count(),
                "dotted_name" => tail = self.text(child),
                _ => {}
            }
        }
        relative_module(&self.package, level, tail)
    }
}
