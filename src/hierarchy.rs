use std::{
    collections::{BTreeSet, HashMap},
    env,
    fs::{self, File},
    io::Write,
    path::Path,
    sync::Arc,
};

use petgraph::{
    algo::{has_path_connecting, toposort},
    dot::Dot,
    graph::{DiGraph, NodeIndex},
};

use crate::error::{RequestError, SynthesisError};
use crate::parser::type_expr;
use crate::schema::{
    simple_name, ClassInfo, ConstructorInfo, MethodInfo, RawIndex, RawTypeParam, TypeExpr,
    TypeParam,
};

pub const OBJECT: &str = "java.lang.Object";
pub const THROWABLE: &str = "java.lang.Throwable";
pub const EXCEPTION: &str = "java.lang.Exception";
pub const RUNTIME_EXCEPTION: &str = "java.lang.RuntimeException";
pub const ERROR: &str = "java.lang.Error";

/// Source of class descriptors. Implementations are shared read-only across
/// requests, hence `Send + Sync`.
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<ClassInfo>, SynthesisError>;

    /// Looks a class up by its simple name, preferring `java.lang`.
    fn resolve_simple(&self, simple: &str) -> Option<Arc<ClassInfo>>;

    /// Reflexive subclass test over `extends` and `implements`.
    fn is_subclass(&self, sub: &str, sup: &str) -> bool;

    fn is_checked_exception(&self, name: &str) -> bool {
        !self.is_subclass(name, RUNTIME_EXCEPTION) && !self.is_subclass(name, ERROR)
    }

    /// `name`, its superclass, the superclass's superclass, and so on.
    fn superclass_chain(&self, name: &str) -> Vec<String> {
        let mut chain = vec![name.to_string()];
        let mut current = name.to_string();
        while let Ok(class) = self.resolve(&current) {
            match &class.superclass {
                Some(TypeExpr::Class { name: sup, .. }) if !chain.contains(sup) => {
                    chain.push(sup.clone());
                    current = sup.clone();
                }
                _ => break,
            }
        }
        chain
    }
}

/// A static type index: class descriptors loaded once from JSON plus the
/// subtype graph (edges point from a class to its direct supertypes).
pub struct TypeIndex {
    classes: HashMap<String, Arc<ClassInfo>>,
    by_simple: HashMap<String, Vec<String>>,
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl TypeIndex {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<TypeIndex, RequestError> {
        let text = fs::read_to_string(path.as_ref())?;
        TypeIndex::from_json(&text)
    }

    pub fn from_json(json: &str) -> Result<TypeIndex, RequestError> {
        let raw: RawIndex =
            serde_json::from_str(json).map_err(|e| RequestError::Classpath(e.to_string()))?;
        let mut classes = Vec::with_capacity(raw.classes.len());
        for rc in raw.classes {
            let type_params = convert_type_params(&rc.type_params, &[])?;
            let class_vars: Vec<&str> = rc.type_params.iter().map(|p| p.name.as_str()).collect();
            let parse = |text: &str, vars: &[&str]| -> Result<TypeExpr, RequestError> {
                type_expr(text)
                    .map(|t| t.bind_vars(vars))
                    .map_err(RequestError::Classpath)
            };
            let superclass = match &rc.superclass {
                Some(s) => Some(parse(s, &class_vars)?),
                None => None,
            };
            let interfaces = rc
                .interfaces
                .iter()
                .map(|i| parse(i, &class_vars))
                .collect::<Result<Vec<_>, _>>()?;
            let constructors = rc
                .constructors
                .iter()
                .map(|c| {
                    Ok(ConstructorInfo {
                        params: c
                            .params
                            .iter()
                            .map(|p| parse(p, &class_vars))
                            .collect::<Result<Vec<_>, RequestError>>()?,
                        throws: c.throws.clone(),
                        modifiers: c.modifiers,
                    })
                })
                .collect::<Result<Vec<_>, RequestError>>()?;
            let mut methods = Vec::with_capacity(rc.methods.len());
            for m in &rc.methods {
                let mut vars = class_vars.clone();
                vars.extend(m.type_params.iter().map(|p| p.name.as_str()));
                methods.push(MethodInfo {
                    name: m.name.clone(),
                    params: m
                        .params
                        .iter()
                        .map(|p| parse(p, &vars))
                        .collect::<Result<Vec<_>, _>>()?,
                    returns: parse(&m.returns, &vars)?,
                    throws: m.throws.clone(),
                    type_params: convert_type_params(&m.type_params, &class_vars)?,
                    modifiers: m.modifiers,
                });
            }
            classes.push(ClassInfo {
                name: rc.name,
                modifiers: rc.modifiers,
                superclass,
                interfaces,
                type_params,
                constructors,
                methods,
            });
        }
        Ok(TypeIndex::new(classes))
    }

    pub fn new(classes: Vec<ClassInfo>) -> TypeIndex {
        let mut index = TypeIndex {
            classes: HashMap::new(),
            by_simple: HashMap::new(),
            graph: DiGraph::new(),
            nodes: HashMap::new(),
        };
        for class in classes {
            let node = index.graph.add_node(class.name.clone());
            index.nodes.insert(class.name.clone(), node);
            index
                .by_simple
                .entry(class.simple_name())
                .or_default()
                .push(class.name.clone());
            index.classes.insert(class.name.clone(), Arc::new(class));
        }
        let mut edges = Vec::new();
        for class in index.classes.values() {
            let mut supers: Vec<&str> = class
                .supertypes()
                .filter_map(|t| match t {
                    TypeExpr::Class { name, .. } => Some(name.as_str()),
                    _ => None,
                })
                .collect();
            if class.superclass.is_none() && class.name != OBJECT {
                supers.push(OBJECT);
            }
            for sup in supers {
                match index.nodes.get(sup) {
                    Some(&to) => edges.push((index.nodes[&class.name], to)),
                    None => log::debug!("supertype {} of {} is not indexed", sup, class.name),
                }
            }
        }
        for (from, to) in edges {
            index.graph.add_edge(from, to, ());
        }
        if let Ok(path) = env::var("DEBUG_CLASS_GRAPH") {
            match File::create(&path) {
                Ok(mut file) => {
                    if let Err(e) = write!(file, "{:?}", Dot::new(&index.graph)) {
                        log::warn!("cannot write {}: {}", path, e);
                    }
                }
                Err(e) => log::warn!("cannot create {}: {}", path, e),
            }
        }
        log::info!("type index loaded: {} classes", index.classes.len());
        index
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

fn convert_type_params(
    raw: &[RawTypeParam],
    outer_vars: &[&str],
) -> Result<Vec<TypeParam>, RequestError> {
    let mut vars: Vec<&str> = outer_vars.to_vec();
    vars.extend(raw.iter().map(|p| p.name.as_str()));
    raw.iter()
        .map(|p| {
            Ok(TypeParam {
                name: p.name.clone(),
                bounds: p
                    .bounds
                    .iter()
                    .map(|b| {
                        type_expr(b)
                            .map(|t| t.bind_vars(&vars))
                            .map_err(RequestError::Classpath)
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            })
        })
        .collect()
}

impl TypeResolver for TypeIndex {
    fn resolve(&self, name: &str) -> Result<Arc<ClassInfo>, SynthesisError> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| SynthesisError::class_not_found(name))
    }

    fn resolve_simple(&self, simple: &str) -> Option<Arc<ClassInfo>> {
        let names = self.by_simple.get(simple)?;
        let best = names
            .iter()
            .find(|n| n.starts_with("java.lang.") && simple_name(n) == simple)
            .or_else(|| names.first())?;
        self.classes.get(best).cloned()
    }

    fn is_subclass(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == OBJECT {
            return true;
        }
        match (self.nodes.get(sub), self.nodes.get(sup)) {
            (Some(&a), Some(&b)) => has_path_connecting(&self.graph, a, b, None),
            _ => false,
        }
    }
}

/// Orders exception classes so that every subclass precedes its superclasses,
/// which keeps each catch clause reachable.
pub fn most_specific_first(names: &BTreeSet<String>, resolver: &dyn TypeResolver) -> Vec<String> {
    let mut g = DiGraph::<&str, ()>::new();
    let nodes: Vec<NodeIndex> = names.iter().map(|n| g.add_node(n.as_str())).collect();
    for (i, a) in names.iter().enumerate() {
        for (j, b) in names.iter().enumerate() {
            if i != j && resolver.is_subclass(a, b) {
                g.add_edge(nodes[i], nodes[j], ());
            }
        }
    }
    match toposort(&g, None) {
        Ok(order) => order.into_iter().map(|n| g[n].to_string()).collect(),
        Err(cycle) => {
            log::warn!("cyclic exception hierarchy at {}", g[cycle.node_id()]);
            names.iter().cloned().collect()
        }
    }
}

/// The nearest class every name in `names` extends; used to type a catch
/// variable shared by several catch clauses.
pub fn common_superclass(names: &[String], resolver: &dyn TypeResolver) -> String {
    let first = match names.first() {
        Some(first) => first,
        None => return THROWABLE.to_string(),
    };
    resolver
        .superclass_chain(first)
        .into_iter()
        .find(|candidate| names.iter().all(|n| resolver.is_subclass(n, candidate)))
        .unwrap_or_else(|| THROWABLE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn java_index() -> TypeIndex {
        let text = fs::read_to_string("tests/java-index.json")
            .expect("Unable to read tests/java-index.json");
        TypeIndex::from_json(&text).unwrap()
    }

    #[test]
    fn test_subclass_through_interfaces() {
        init();
        let index = java_index();
        assert!(index.is_subclass("java.io.FileReader", "java.io.Reader"));
        assert!(index.is_subclass("java.util.ArrayList", "java.util.Collection"));
        assert!(index.is_subclass("java.io.BufferedReader", "java.lang.Object"));
        assert!(!index.is_subclass("java.io.Reader", "java.io.FileReader"));
    }

    #[test]
    fn test_checked_exceptions() {
        let index = java_index();
        assert!(index.is_checked_exception("java.io.IOException"));
        assert!(index.is_checked_exception("java.io.FileNotFoundException"));
        assert!(!index.is_checked_exception("java.lang.IllegalArgumentException"));
    }

    #[test]
    fn test_exception_order() {
        let index = java_index();
        let names: BTreeSet<String> = ["java.io.IOException", "java.io.FileNotFoundException"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let order = most_specific_first(&names, &index);
        assert_eq!(
            order,
            vec!["java.io.FileNotFoundException", "java.io.IOException"]
        );
        assert_eq!(common_superclass(&order, &index), "java.io.IOException");
    }

    #[test]
    fn test_resolve_simple_prefers_java_lang() {
        let index = java_index();
        assert_eq!(index.resolve_simple("String").unwrap().name, "java.lang.String");
        assert!(index.resolve_simple("NoSuchThing").is_none());
        assert!(matches!(
            index.resolve("com.example.Missing"),
            Err(SynthesisError::ClassNotFound { .. })
        ));
    }
}
