//! Call resolution strategies.
//!
//! [`SymbolIndex`] is built once per build from every parsed file and is
//! read-only afterwards, so resolution can fan out across threads without
//! locking. Two [`CallResolver`]s work against it:
//!
//! - [`HeuristicResolver`]: bare-name matching, same file first, then a unique
//!   match elsewhere.
//! - [`SemanticResolver`]: follows scopes, imports (including relative and
//!   re-exported names), assignment chains, annotations, `self` attributes and
//!   base classes. When it cannot decide, the call falls back to the
//!   heuristic result for that call only.
use super::{NodeId, ResolutionMethod, ResolveStrategy};
use crate::parser::{
    join_module, AssignTarget, Assignment, CallKind, CallSite, Definition, DefinitionKind, Expr,
    ImportTarget, ParsedFile,
};
use std::collections::{HashMap, HashSet};
use tracing::trace;

const DEFAULT_MAX_DEPTH: usize = 12;

/// A definition addressed by (file index, definition index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefRef {
    pub file: usize,
    pub def: usize,
}

#[derive(Debug)]
pub struct SymbolIndex<'a> {
    files: &'a [ParsedFile],
    by_name: HashMap<&'a str, Vec<DefRef>>,
    modules: HashMap<&'a str, usize>,
    packages: HashSet<String>,
    /// Package of each file's directory, the base for script-style imports.
    dir_packages: Vec<String>,
    top_level: Vec<HashMap<&'a str, usize>>,
    children: Vec<HashMap<usize, HashMap<&'a str, usize>>>,
}

impl<'a> SymbolIndex<'a> {
    #[must_use]
    pub fn new(files: &'a [ParsedFile]) -> Self {
        let mut by_name: HashMap<&'a str, Vec<DefRef>> = HashMap::new();
        let mut modules = HashMap::new();
        let mut packages = HashSet::new();
        let mut dir_packages = Vec::with_capacity(files.len());
        let mut top_level = Vec::with_capacity(files.len());
        let mut children = Vec::with_capacity(files.len());

        for (fi, file) in files.iter().enumerate() {
            modules.insert(file.module.as_str(), fi);
            let parts: Vec<&str> = file.module.split('.').collect();
            for i in 1..parts.len() {
                packages.insert(parts[..i].join("."));
            }
            dir_packages.push(if file.is_package {
                file.module.clone()
            } else {
                file.module.rsplit_once('.').map(|(p, _)| p.to_string()).unwrap_or_default()
            });

            let mut top: HashMap<&'a str, usize> = HashMap::new();
            let mut nested: HashMap<usize, HashMap<&'a str, usize>> = HashMap::new();
            for (di, def) in file.definitions.iter().enumerate() {
                by_name.entry(def.name.as_str()).or_default().push(DefRef { file: fi, def: di });
                // later definitions shadow earlier ones
                match def.parent {
                    None => {
                        top.insert(def.name.as_str(), di);
                    }
                    Some(p) => {
                        nested.entry(p).or_default().insert(def.name.as_str(), di);
                    }
                }
            }
            top_level.push(top);
            children.push(nested);
        }

        Self { files, by_name, modules, packages, dir_packages, top_level, children }
    }

    #[must_use]
    pub fn files(&self) -> &'a [ParsedFile] {
        self.files
    }

    #[must_use]
    pub fn file(&self, index: usize) -> &'a ParsedFile {
        &self.files[index]
    }

    #[must_use]
    pub fn definition(&self, r: DefRef) -> &'a Definition {
        &self.files[r.file].definitions[r.def]
    }

    #[must_use]
    pub fn node_id(&self, r: DefRef) -> NodeId {
        let file = &self.files[r.file];
        let def = &file.definitions[r.def];
        match def.kind {
            DefinitionKind::Class => NodeId::class(&file.rel_path, &def.qualified_name),
            DefinitionKind::Function | DefinitionKind::Method => {
                NodeId::func(&file.rel_path, &def.qualified_name)
            }
        }
    }

    /// All definitions sharing a bare name, in file then source order.
    #[must_use]
    pub fn candidates(&self, name: &str) -> &[DefRef] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    #[must_use]
    pub fn knows_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// File implementing the fully qualified `module`.
    #[must_use]
    pub fn module_file(&self, module: &str) -> Option<usize> {
        self.modules.get(module).copied()
    }

    /// True for project modules, namespace packages and the root package.
    #[must_use]
    pub fn is_module(&self, module: &str) -> bool {
        module.is_empty() || self.packages.contains(module) || self.modules.contains_key(module)
    }

    /// Qualify an absolute import written in `file`: from the project root
    /// first, then from the importing file's directory (`utils/c.py` doing
    /// `import d` gets `utils/d.py`). `None` means the module lives outside
    /// the project.
    #[must_use]
    pub fn qualify_import(&self, file: usize, module: &str) -> Option<String> {
        if self.is_module(module) {
            return Some(module.to_string());
        }
        let dir = &self.dir_packages[file];
        if dir.is_empty() {
            return None;
        }
        let local = join_module(dir, module);
        self.is_module(&local).then_some(local)
    }

    #[must_use]
    pub fn top_level_def(&self, file: usize, name: &str) -> Option<usize> {
        self.top_level[file].get(name).copied()
    }

    #[must_use]
    pub fn child_def(&self, file: usize, parent: usize, name: &str) -> Option<usize> {
        self.children[file].get(&parent).and_then(|m| m.get(name)).copied()
    }

    /// Class whose body (or method) encloses `scope`.
    #[must_use]
    pub fn enclosing_class(&self, file: usize, scope: Option<usize>) -> Option<usize> {
        let defs = &self.files[file].definitions;
        let mut cur = scope;
        while let Some(i) = cur {
            let d = &defs[i];
            match d.kind {
                DefinitionKind::Class => return Some(i),
                DefinitionKind::Method => return d.class_scope,
                DefinitionKind::Function => cur = d.parent,
            }
        }
        None
    }

    fn is_class(&self, r: DefRef) -> bool {
        self.definition(r).kind == DefinitionKind::Class
    }
}

/// Outcome of resolving one call expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved { target: DefRef, method: ResolutionMethod },
    Unresolved,
}

/// A call site together with where it appears.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'c> {
    pub file: usize,
    /// Enclosing definition; `None` for module-level code.
    pub scope: Option<usize>,
    pub call: &'c CallSite,
}

/// A pluggable call resolution strategy. Implementations never fail; a call
/// they cannot place is reported as [`Resolution::Unresolved`].
pub trait CallResolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, index: &SymbolIndex<'_>, ctx: &CallContext<'_>) -> Resolution;
}

#[must_use]
pub fn resolver_for(strategy: ResolveStrategy) -> Box<dyn CallResolver> {
    match strategy {
        ResolveStrategy::Heuristic => Box::new(HeuristicResolver),
        ResolveStrategy::Semantic => Box::new(SemanticResolver::default()),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicResolver;

impl HeuristicResolver {
    fn accepts(kind: CallKind, def: &Definition) -> bool {
        match kind {
            CallKind::BareName => def.kind != DefinitionKind::Method,
            CallKind::SelfMethod => def.kind == DefinitionKind::Method,
            CallKind::Attribute => true,
        }
    }

    fn prefer_local(index: &SymbolIndex<'_>, ctx: &CallContext<'_>, local: &[DefRef]) -> DefRef {
        if ctx.call.kind == CallKind::SelfMethod {
            if let Some(class) = index.enclosing_class(ctx.file, ctx.scope) {
                if let Some(r) = local.iter().find(|r| index.definition(**r).class_scope == Some(class)) {
                    return *r;
                }
            }
        }
        local
            .iter()
            .find(|r| index.definition(**r).parent.is_none())
            .copied()
            .unwrap_or(local[0])
    }
}

impl CallResolver for HeuristicResolver {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn resolve(&self, index: &SymbolIndex<'_>, ctx: &CallContext<'_>) -> Resolution {
        let candidates: Vec<DefRef> = index
            .candidates(&ctx.call.name)
            .iter()
            .copied()
            .filter(|r| Self::accepts(ctx.call.kind, index.definition(*r)))
            .collect();
        let local: Vec<DefRef> = candidates.iter().copied().filter(|r| r.file == ctx.file).collect();
        let target = if !local.is_empty() {
            Some(Self::prefer_local(index, ctx, &local))
        } else if let [only] = candidates.as_slice() {
            Some(*only)
        } else {
            None
        };
        match target {
            Some(target) => Resolution::Resolved { target, method: ResolutionMethod::Heuristic },
            None => Resolution::Unresolved,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SemanticResolver {
    fallback: HeuristicResolver,
    max_depth: usize,
}

impl Default for SemanticResolver {
    fn default() -> Self {
        Self { fallback: HeuristicResolver, max_depth: DEFAULT_MAX_DEPTH }
    }
}

impl SemanticResolver {
    /// Bound on nested lookups (assignment chains, imports, bases).
    #[must_use]
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth, ..Self::default() }
    }
}

impl CallResolver for SemanticResolver {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn resolve(&self, index: &SymbolIndex<'_>, ctx: &CallContext<'_>) -> Resolution {
        let lookup = Lookup { index, max_depth: self.max_depth };
        match lookup.eval(ctx.file, ctx.scope, &ctx.call.callee, 0) {
            Some(Value::Def(target)) => Resolution::Resolved { target, method: ResolutionMethod::Semantic },
            // bound to something outside the project: a name match would be a false positive
            Some(Value::External) => Resolution::Unresolved,
            _ => {
                trace!(callee = %ctx.call.callee_text, line = ctx.call.line, "semantic lookup inconclusive");
                self.fallback.resolve(index, ctx)
            }
        }
    }
}

/// What an expression evaluates to, as far as static lookup can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Module(String),
    Def(DefRef),
    Instance(DefRef),
    /// `super()` inside the given class.
    Super(DefRef),
    External,
}

struct Lookup<'i, 'a> {
    index: &'i SymbolIndex<'a>,
    max_depth: usize,
}

impl Lookup<'_, '_> {
    fn eval(&self, file: usize, scope: Option<usize>, expr: &Expr, depth: usize) -> Option<Value> {
        if depth > self.max_depth {
            return None;
        }
        match expr {
            Expr::Name(name) => self.lookup_name(file, scope, name, depth + 1),
            Expr::Attribute { base, attr } => {
                let base = self.eval(file, scope, base, depth + 1)?;
                self.member(&base, attr, depth + 1)
            }
            Expr::Call(callee) => {
                if matches!(callee.as_ref(), Expr::Name(n) if n == "super") {
                    return self
                        .index
                        .enclosing_class(file, scope)
                        .map(|def| Value::Super(DefRef { file, def }));
                }
                match self.eval(file, scope, callee, depth + 1)? {
                    Value::Def(d) if self.index.is_class(d) => Some(Value::Instance(d)),
                    Value::External => Some(Value::External),
                    _ => None,
                }
            }
            Expr::Other => None,
        }
    }

    fn lookup_name(&self, file: usize, scope: Option<usize>, name: &str, depth: usize) -> Option<Value> {
        let defs = &self.index.file(file).definitions;
        let mut cur = scope;
        let mut innermost = true;
        while let Some(i) = cur {
            let def = &defs[i];
            // class bodies are not visible from the methods nested in them
            if innermost || def.kind != DefinitionKind::Class {
                if let Some(child) = self.index.child_def(file, i, name) {
                    return Some(Value::Def(DefRef { file, def: child }));
                }
                if def.kind == DefinitionKind::Method && def.first_param.as_deref() == Some(name) {
                    if let Some(class) = def.class_scope {
                        let class = DefRef { file, def: class };
                        return Some(if name == "cls" { Value::Def(class) } else { Value::Instance(class) });
                    }
                }
                // a local binding ends the search even when its value is unknown
                if let Some(a) = find_assignment(&def.assignments, |t| matches!(t, AssignTarget::Name(n) if n == name)) {
                    return self.eval_assignment(file, a, depth);
                }
            }
            innermost = false;
            cur = def.parent;
        }
        self.module_binding(file, name, depth)
    }

    fn module_binding(&self, file: usize, name: &str, depth: usize) -> Option<Value> {
        if depth > self.max_depth {
            return None;
        }
        let parsed = self.index.file(file);
        let def = self.index.top_level_def(file, name);
        let assigned = find_assignment(&parsed.module_assignments, |t| matches!(t, AssignTarget::Name(n) if n == name));
        match (def, assigned) {
            // whichever binding comes later in the file wins
            (Some(d), Some(a)) if a.line > parsed.definitions[d].line_end => {
                return self.eval_assignment(file, a, depth);
            }
            (Some(d), _) => return Some(Value::Def(DefRef { file, def: d })),
            (None, Some(a)) => return self.eval_assignment(file, a, depth),
            (None, None) => {}
        }
        if let Some(binding) = parsed.imports.iter().rev().find(|b| b.local == name) {
            return self.import_value(file, &binding.target, depth + 1);
        }
        parsed.imports.iter().find_map(|b| match &b.target {
            ImportTarget::Wildcard(module) => {
                let module = self.index.qualify_import(file, module)?;
                self.index.module_file(&module)?;
                self.module_member(&module, name, depth + 1)
            }
            _ => None,
        })
    }

    fn eval_assignment(&self, file: usize, a: &Assignment, depth: usize) -> Option<Value> {
        if let Some(annotation) = &a.annotation {
            match self.eval(file, a.scope, annotation, depth + 1) {
                Some(Value::Def(d)) if self.index.is_class(d) => return Some(Value::Instance(d)),
                Some(Value::External) => return Some(Value::External),
                _ => {}
            }
        }
        self.eval(file, a.scope, &a.value, depth + 1)
    }

    fn import_value(&self, file: usize, target: &ImportTarget, depth: usize) -> Option<Value> {
        match target {
            ImportTarget::Module(module) => {
                Some(self.index.qualify_import(file, module).map_or(Value::External, Value::Module))
            }
            ImportTarget::Symbol { module, name } => match self.index.qualify_import(file, module) {
                Some(module) => self.module_member(&module, name, depth + 1),
                None => Some(Value::External),
            },
            ImportTarget::Wildcard(_) => None,
        }
    }

    fn module_member(&self, module: &str, attr: &str, depth: usize) -> Option<Value> {
        if depth > self.max_depth {
            return None;
        }
        if let Some(file) = self.index.module_file(module) {
            if let Some(v) = self.module_binding(file, attr, depth + 1) {
                return Some(v);
            }
        }
        let sub = join_module(module, attr);
        self.index.is_module(&sub).then_some(Value::Module(sub))
    }

    fn member(&self, value: &Value, attr: &str, depth: usize) -> Option<Value> {
        match value {
            Value::Module(m) => self.module_member(m, attr, depth),
            Value::Def(d) if self.index.is_class(*d) => self.class_member(*d, attr, depth).map(Value::Def),
            Value::Def(_) => None,
            Value::Instance(c) => self
                .class_member(*c, attr, depth)
                .map(Value::Def)
                .or_else(|| self.instance_attr(*c, attr, depth)),
            Value::Super(c) => self.base_member(*c, attr, depth).map(Value::Def),
            Value::External => Some(Value::External),
        }
    }

    fn class_member(&self, class: DefRef, attr: &str, depth: usize) -> Option<DefRef> {
        if depth > self.max_depth {
            return None;
        }
        if let Some(def) = self.index.child_def(class.file, class.def, attr) {
            return Some(DefRef { file: class.file, def });
        }
        self.base_member(class, attr, depth)
    }

    fn bases(&self, class: DefRef, depth: usize) -> Vec<DefRef> {
        let def = self.index.definition(class);
        def.bases
            .iter()
            .filter_map(|b| match self.eval(class.file, def.parent, b, depth + 1) {
                Some(Value::Def(d)) if self.index.is_class(d) && d != class => Some(d),
                _ => None,
            })
            .collect()
    }

    fn base_member(&self, class: DefRef, attr: &str, depth: usize) -> Option<DefRef> {
        self.bases(class, depth)
            .into_iter()
            .find_map(|b| self.class_member(b, attr, depth + 1))
    }

    fn instance_attr(&self, class: DefRef, attr: &str, depth: usize) -> Option<Value> {
        if depth > self.max_depth {
            return None;
        }
        let def = self.index.definition(class);
        let assigned = find_assignment(&def.assignments, |t| matches!(t, AssignTarget::SelfAttr(n) if n == attr))
            .or_else(|| find_assignment(&def.assignments, |t| matches!(t, AssignTarget::Name(n) if n == attr)));
        if let Some(a) = assigned {
            return self.eval_assignment(class.file, a, depth + 1);
        }
        self.bases(class, depth)
            .into_iter()
            .find_map(|b| self.instance_attr(b, attr, depth + 1))
    }
}

/// Last assignment matching `pred`; later bindings win.
fn find_assignment(assignments: &[Assignment], pred: impl Fn(&AssignTarget) -> bool) -> Option<&Assignment> {
    assignments.iter().rev().find(|a| pred(&a.target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::PythonParser;

    fn parse_all(files: &[(&str, &str)]) -> Vec<ParsedFile> {
        let mut parser = PythonParser::new().expect("grammar");
        files.iter().map(|(rel, src)| parser.parse_source(src, rel).expect("parse")).collect()
    }

    /// Resolve every call named `callee` inside definition `caller` of `file`.
    fn resolve(
        files: &[ParsedFile],
        resolver: &dyn CallResolver,
        file: &str,
        caller: &str,
        callee: &str,
    ) -> Option<(String, ResolutionMethod)> {
        let index = SymbolIndex::new(files);
        let fi = files.iter().position(|f| f.rel_path == file).expect("file");
        let di = files[fi]
            .definitions
            .iter()
            .position(|d| d.qualified_name == caller)
            .expect("caller");
        let call = files[fi].definitions[di]
            .calls
            .iter()
            .find(|c| c.name == callee)
            .expect("call site");
        match resolver.resolve(&index, &CallContext { file: fi, scope: Some(di), call }) {
            Resolution::Resolved { target, method } => Some((index.node_id(target).0, method)),
            Resolution::Unresolved => None,
        }
    }

    fn helper_project() -> Vec<ParsedFile> {
        parse_all(&[
            ("a.py", "def helper():\n    return 1\n"),
            ("b.py", "def helper():\n    return 2\n"),
            ("c.py", "from a import helper\n\ndef run():\n    helper()\n"),
        ])
    }

    #[test]
    fn heuristic_leaves_ambiguous_names_unresolved() {
        let files = helper_project();
        assert_eq!(resolve(&files, &HeuristicResolver, "c.py", "run", "helper"), None);
    }

    #[test]
    fn semantic_follows_the_import() {
        let files = helper_project();
        assert_eq!(
            resolve(&files, &SemanticResolver::default(), "c.py", "run", "helper"),
            Some(("func:a.py:helper".into(), ResolutionMethod::Semantic))
        );
    }

    #[test]
    fn heuristic_prefers_same_file_then_unique_name() {
        let files = parse_all(&[
            ("x.py", "def util():\n    pass\n\ndef main():\n    util()\n    only_elsewhere()\n"),
            ("y.py", "def util():\n    pass\n\ndef only_elsewhere():\n    pass\n"),
        ]);
        assert_eq!(
            resolve(&files, &HeuristicResolver, "x.py", "main", "util"),
            Some(("func:x.py:util".into(), ResolutionMethod::Heuristic))
        );
        assert_eq!(
            resolve(&files, &HeuristicResolver, "x.py", "main", "only_elsewhere"),
            Some(("func:y.py:only_elsewhere".into(), ResolutionMethod::Heuristic))
        );
    }

    #[test]
    fn semantic_resolves_module_attribute_and_alias() {
        let files = parse_all(&[
            ("b.py", "def process():\n    pass\n"),
            ("a.py", "import b\nimport b as bee\n\ndef main():\n    b.process()\n\ndef other():\n    bee.process()\n"),
        ]);
        let semantic = SemanticResolver::default();
        assert_eq!(
            resolve(&files, &semantic, "a.py", "main", "process").map(|r| r.0),
            Some("func:b.py:process".into())
        );
        assert_eq!(
            resolve(&files, &semantic, "a.py", "other", "process").map(|r| r.0),
            Some("func:b.py:process".into())
        );
    }

    #[test]
    fn semantic_dispatches_through_self_instances_and_bases() {
        let src = r"
class Base:
    def save(self):
        pass

class Store(Base):
    def flush(self):
        pass

class Repo:
    def __init__(self, store: Store):
        self.store = store
        self.backup = Store()

    def run(self):
        self.store.save()
        self.backup.flush()
        s = Store()
        s.flush()
";
        let files = parse_all(&[("repo.py", src)]);
        let semantic = SemanticResolver::default();
        assert_eq!(
            resolve(&files, &semantic, "repo.py", "Repo.run", "save"),
            Some(("func:repo.py:Base.save".into(), ResolutionMethod::Semantic))
        );
        assert_eq!(
            resolve(&files, &semantic, "repo.py", "Repo.run", "flush"),
            Some(("func:repo.py:Store.flush".into(), ResolutionMethod::Semantic))
        );
        // constructor call targets the class node
        assert_eq!(
            resolve(&files, &semantic, "repo.py", "Repo.run", "Store").map(|r| r.0),
            Some("class:repo.py:Store".into())
        );
    }

    #[test]
    fn semantic_handles_relative_and_reexported_imports() {
        let files = parse_all(&[
            ("pkg/__init__.py", "from .core import engine\n"),
            ("pkg/core.py", "def engine():\n    pass\n"),
            ("pkg/app.py", "from . import engine as go\n\ndef start():\n    go()\n"),
        ]);
        assert_eq!(
            resolve(&files, &SemanticResolver::default(), "pkg/app.py", "start", "go").map(|r| r.0),
            Some("func:pkg/core.py:engine".into())
        );
    }

    #[test]
    fn semantic_treats_third_party_imports_as_unresolved() {
        let files = parse_all(&[
            ("local.py", "def array():\n    pass\n"),
            ("main.py", "import numpy as np\n\ndef go():\n    np.array()\n"),
        ]);
        assert_eq!(resolve(&files, &SemanticResolver::default(), "main.py", "go", "array"), None);
        // the heuristic happily matches the lone local definition
        assert!(resolve(&files, &HeuristicResolver, "main.py", "go", "array").is_some());
    }

    #[test]
    fn semantic_falls_back_per_call() {
        let files = parse_all(&[
            ("lib.py", "def unique_name():\n    pass\n"),
            ("main.py", "def go(obj):\n    obj.unique_name()\n"),
        ]);
        assert_eq!(
            resolve(&files, &SemanticResolver::default(), "main.py", "go", "unique_name"),
            Some(("func:lib.py:unique_name".into(), ResolutionMethod::Heuristic))
        );
    }

    #[test]
    fn local_bindings_shadow_module_definitions() {
        let src = r"
def handler():
    pass

def by_param(handler):
    handler()

def by_splat(*handler):
    handler()

def by_kwargs(**handler):
    handler()

def by_loop(xs):
    for handler in xs:
        handler()

def by_with(ctx):
    with ctx as handler:
        handler()

def by_except():
    try:
        pass
    except Exception as handler:
        handler()

def by_comprehension(xs):
    return [handler() for handler in xs]

def by_walrus(xs):
    if (handler := xs):
        handler()

def by_unpacking(pair):
    handler, other = pair
    handler()

def unshadowed():
    handler()
";
        let files = parse_all(&[("m.py", src)]);
        let semantic = SemanticResolver::default();
        for caller in [
            "by_param",
            "by_splat",
            "by_kwargs",
            "by_loop",
            "by_with",
            "by_except",
            "by_comprehension",
            "by_walrus",
            "by_unpacking",
        ] {
            assert_eq!(
                resolve(&files, &semantic, "m.py", caller, "handler"),
                Some(("func:m.py:handler".into(), ResolutionMethod::Heuristic)),
                "{caller}"
            );
        }
        assert_eq!(
            resolve(&files, &semantic, "m.py", "unshadowed", "handler"),
            Some(("func:m.py:handler".into(), ResolutionMethod::Semantic))
        );
    }

    #[test]
    fn shadowing_parameter_blocks_attribute_dispatch() {
        let src = r"
import b

def run(b):
    b.process()
";
        let files = parse_all(&[("b.py", "def process():\n    pass\n"), ("a.py", src)]);
        assert_eq!(
            resolve(&files, &SemanticResolver::default(), "a.py", "run", "process"),
            Some(("func:b.py:process".into(), ResolutionMethod::Heuristic))
        );
    }

    #[test]
    fn module_level_rebinding_after_definition_wins() {
        let src = "def task():\n    pass\n\nfor task in range(3):\n    pass\n\ndef go():\n    task()\n";
        let files = parse_all(&[("m.py", src)]);
        assert_eq!(
            resolve(&files, &SemanticResolver::default(), "m.py", "go", "task"),
            Some(("func:m.py:task".into(), ResolutionMethod::Heuristic))
        );
    }

    #[test]
    fn stdlib_imports_never_bind_to_nested_project_modules() {
        let files = parse_all(&[
            ("utils/json.py", "def loads(s):\n    pass\n"),
            ("app.py", "import json\nfrom json import dumps\n\ndef go():\n    json.loads('x')\n    dumps()\n"),
        ]);
        let semantic = SemanticResolver::default();
        assert_eq!(resolve(&files, &semantic, "app.py", "go", "loads"), None);
        assert_eq!(resolve(&files, &semantic, "app.py", "go", "dumps"), None);
    }

    #[test]
    fn absolute_imports_resolve_from_root_then_importer_directory() {
        let files = parse_all(&[
            ("d.py", "def helper():\n    pass\n"),
            ("utils/d.py", "def helper():\n    pass\n"),
            ("utils/e.py", "def tool():\n    pass\n"),
            ("utils/c.py", "import d\nfrom e import tool\n\ndef go():\n    d.helper()\n    tool()\n"),
            ("main.py", "import utils.e\nfrom utils import c\n\ndef run():\n    c.go()\n"),
        ]);
        let semantic = SemanticResolver::default();
        // the root module shadows the sibling of the same name
        assert_eq!(
            resolve(&files, &semantic, "utils/c.py", "go", "helper"),
            Some(("func:d.py:helper".into(), ResolutionMethod::Semantic))
        );
        assert_eq!(
            resolve(&files, &semantic, "utils/c.py", "go", "tool"),
            Some(("func:utils/e.py:tool".into(), ResolutionMethod::Semantic))
        );
        assert_eq!(
            resolve(&files, &semantic, "main.py", "run", "go"),
            Some(("func:utils/c.py:go".into(), ResolutionMethod::Semantic))
        );

        let index = SymbolIndex::new(&files);
        let c = files.iter().position(|f| f.rel_path == "utils/c.py").unwrap();
        let main = files.iter().position(|f| f.rel_path == "main.py").unwrap();
        assert_eq!(index.qualify_import(c, "e").as_deref(), Some("utils.e"));
        assert_eq!(index.qualify_import(main, "e"), None);
        assert_eq!(index.qualify_import(main, "json"), None);
    }

    #[test]
    fn self_referential_assignments_terminate() {
        let files = parse_all(&[("loop.py", "def f():\n    x = x\n    x.go()\n")]);
        assert_eq!(resolve(&files, &SemanticResolver::with_max_depth(4), "loop.py", "f", "go"), None);
    }
}
