use crate::environment::Environment;
use crate::error::SynthesisError;
use crate::java::{CallTarget, Expr, Stmt};
use crate::types::{BoundMember, Type};

/// Chains kept per composition level; beyond this the cheapest survive.
const MAX_FRONTIER: usize = 4096;

/// An expression together with its static type.
#[derive(Clone, Debug)]
pub struct Typed {
    pub expr: Expr,
    pub ty: Type,
}

#[derive(Clone)]
struct Chain {
    root: String,
    root_ty: Type,
    steps: Vec<BoundMember>,
}

impl Chain {
    fn ty(&self) -> &Type {
        self.steps.last().map_or(&self.root_ty, |s| &s.returns)
    }

    fn cost(&self, arg_weight: usize) -> usize {
        let args: usize = self.steps.iter().map(|s| s.params.len()).sum();
        self.steps.len() + arg_weight * args
    }

    // true if the last type already appeared earlier in the chain
    fn loops(&self) -> bool {
        let last = self.ty();
        let earlier = std::iter::once(&self.root_ty)
            .chain(self.steps[..self.steps.len().saturating_sub(1)].iter().map(|s| &s.returns));
        earlier.into_iter().any(|t| t == last)
    }
}

/// Type-directed search for an expression of a requested type.
///
/// Precedence: a live variable, a functional-interface stub, a constructor or
/// static factory, a method chain from a live variable, and for primitives a
/// default literal. Anything freshly built is bound to a new variable; the
/// binding statements are appended to `out`.
pub struct Enumerator<'a, 'r> {
    env: &'a mut Environment<'r>,
}

impl<'a, 'r> Enumerator<'a, 'r> {
    pub fn new(env: &'a mut Environment<'r>) -> Self {
        Enumerator { env }
    }

    pub fn search(
        &mut self,
        target: &Type,
        depth: usize,
        out: &mut Vec<Stmt>,
    ) -> Result<Typed, SynthesisError> {
        if depth > self.env.config().max_argument_depth {
            return Err(SynthesisError::exhausted(target.render()));
        }
        log::debug!("search {} at depth {}", target.render(), depth);
        if let Some(found) = self.from_scope(target) {
            return Ok(found);
        }
        if let Some(stub) = self.functional_stub(target) {
            return Ok(stub);
        }
        let target = self.concretize(target)?;
        if let Some(built) = self.construct(&target, depth, out)? {
            return Ok(self.bind(built, out));
        }
        if let Some(chained) = self.compose(&target, depth, out) {
            return Ok(self.bind(chained, out));
        }
        if let Some(literal) = target.as_primitive().and_then(|p| p.default_literal()) {
            let found = Typed {
                expr: Expr::Literal(literal.to_string()),
                ty: target.clone(),
            };
            return Ok(self.bind(found, out));
        }
        log::debug!("search {} exhausted", target.render());
        Err(SynthesisError::exhausted(target.render()))
    }

    /// Searches every parameter in order.
    pub fn arguments(
        &mut self,
        params: &[Type],
        depth: usize,
        out: &mut Vec<Stmt>,
    ) -> Result<Vec<Expr>, SynthesisError> {
        params
            .iter()
            .map(|p| self.search(p, depth, out).map(|t| t.expr))
            .collect()
    }

    fn from_scope(&mut self, target: &Type) -> Option<Typed> {
        // most recently bound first among equals
        let candidates: Vec<(String, Type, u32)> = self
            .env
            .assignable_variables(target)
            .into_iter()
            .rev()
            .map(|v| (v.name.clone(), v.ty.clone(), v.ref_count))
            .collect();
        let (name, ty, _) = self
            .env
            .ranker()
            .rank(candidates, |c| c.2 as usize)
            .into_iter()
            .next()?;
        self.env.use_variable(&name);
        Some(Typed {
            expr: Expr::Var(name),
            ty,
        })
    }

    fn functional_stub(&mut self, target: &Type) -> Option<Typed> {
        let method = target.functional_method(self.env.resolver())?;
        let result = if method.returns.is_void() {
            None
        } else {
            Some(match method.returns.as_primitive() {
                Some(p) => p.default_literal().unwrap_or("null").to_string(),
                None => "null".to_string(),
            })
        };
        log::debug!("stubbing functional interface {}", target.render());
        Some(Typed {
            expr: Expr::Lambda {
                arity: method.params.len(),
                result,
            },
            ty: target.clone(),
        })
    }

    /// Binds the free parameters of a generic class, preferring types that
    /// already occur in scope and have been used least.
    pub fn concretize(&mut self, target: &Type) -> Result<Type, SynthesisError> {
        let class = match target.class_info() {
            Some(class) if target.is_free_generic() => class.clone(),
            _ => return Ok(target.clone()),
        };
        let resolver = self.env.resolver();
        let mut args = Vec::with_capacity(class.type_params.len());
        for param in &class.type_params {
            let bound = Type::bound_of(param, resolver)?;
            let candidates: Vec<(String, Type)> = self
                .env
                .scope()
                .live
                .iter()
                .filter(|v| v.ty.is_reference() && !v.ty.is_free_generic())
                .filter(|v| v.ty.is_assignable_to(&bound, resolver))
                .map(|v| (v.name.clone(), v.ty.clone()))
                .collect();
            let picked = self
                .env
                .ranker()
                .rank(candidates, |c| c.1.ref_count() as usize)
                .into_iter()
                .next();
            match picked {
                Some((name, ty)) => {
                    self.env.use_type_of(&name);
                    args.push(ty);
                }
                None => args.push(bound),
            }
        }
        let concrete = Type::concretized(class, args)?;
        log::debug!("concretized {} as {}", target.render(), concrete.render());
        Ok(concrete)
    }

    fn construct(
        &mut self,
        target: &Type,
        depth: usize,
        out: &mut Vec<Stmt>,
    ) -> Result<Option<Typed>, SynthesisError> {
        let resolver = self.env.resolver();
        let mut members = target.constructors(resolver);
        members.extend(target.static_factories(resolver));
        members.retain(|m| !m.throws_checked());
        let ranked = self.env.ranker().rank(members, |m| m.params.len());
        for member in ranked {
            let snapshot = self.env.snapshot();
            let mut local = Vec::new();
            match self.arguments(&member.params, depth + 1, &mut local) {
                Ok(args) => {
                    let expr = invocation(self.env, &member, None, args)?;
                    out.extend(local);
                    return Ok(Some(Typed {
                        expr,
                        ty: member.returns.clone(),
                    }));
                }
                Err(e) => {
                    log::debug!("{}({} args) rejected: {}", member.name, member.params.len(), e);
                    self.env.restore(snapshot);
                }
            }
        }
        Ok(None)
    }

    fn compose(&mut self, target: &Type, depth: usize, out: &mut Vec<Stmt>) -> Option<Typed> {
        let resolver = self.env.resolver();
        let max_len = self.env.config().max_compose_length;
        let weight = self.env.config().arg_cost_weight;
        let mut frontier: Vec<Chain> = self
            .env
            .scope()
            .live
            .iter()
            .filter(|v| v.ty.class_info().is_some())
            .map(|v| Chain {
                root: v.name.clone(),
                root_ty: v.ty.clone(),
                steps: Vec::new(),
            })
            .collect();
        let mut complete = Vec::new();
        for len in 1..=max_len {
            let mut next = Vec::new();
            for chain in &frontier {
                for m in chain.ty().methods(resolver) {
                    if m.is_static || m.returns.is_void() || m.throws_checked() {
                        continue;
                    }
                    let mut extended = chain.clone();
                    extended.steps.push(m);
                    if extended.ty().is_assignable_to(target, resolver) {
                        complete.push(extended.clone());
                    }
                    if len < max_len && extended.ty().class_info().is_some() && !extended.loops() {
                        next.push(extended);
                    }
                }
            }
            if next.len() > MAX_FRONTIER {
                log::debug!("chain frontier of {} truncated", next.len());
                next.sort_by_key(|c| c.cost(weight));
                next.truncate(MAX_FRONTIER);
            }
            frontier = next;
        }
        let ranked = self.env.ranker().rank(complete, |c| c.cost(weight));
        for chain in ranked {
            let snapshot = self.env.snapshot();
            let mut local = Vec::new();
            match self.realize(&chain, depth, &mut local) {
                Ok(expr) => {
                    out.extend(local);
                    self.env.use_variable(&chain.root);
                    log::debug!("composed {} for {}", expr.render(), target.render());
                    return Some(Typed {
                        expr,
                        ty: chain.ty().clone(),
                    });
                }
                Err(e) => {
                    log::debug!("chain from {} rejected: {}", chain.root, e);
                    self.env.restore(snapshot);
                }
            }
        }
        None
    }

    fn realize(&mut self, chain: &Chain, depth: usize, out: &mut Vec<Stmt>) -> Result<Expr, SynthesisError> {
        let mut expr = Expr::Var(chain.root.clone());
        for step in &chain.steps {
            let args = self.arguments(&step.params, depth + 1, out)?;
            expr = Expr::Call {
                target: CallTarget::Receiver(Box::new(expr)),
                method: step.name.clone(),
                args,
                throws: step.throws.clone(),
            };
        }
        Ok(expr)
    }

    fn bind(&mut self, found: Typed, out: &mut Vec<Stmt>) -> Typed {
        let name = self.env.declare_fresh(&found.ty);
        out.push(Stmt::assign(&name, found.expr));
        self.env.use_variable(&name);
        Typed {
            expr: Expr::Var(name),
            ty: found.ty,
        }
    }
}

/// The call expression for `member`. Instance methods need a receiver.
pub fn invocation(
    env: &mut Environment,
    member: &BoundMember,
    receiver: Option<Expr>,
    args: Vec<Expr>,
) -> Result<Expr, SynthesisError> {
    if member.is_constructor {
        return Ok(Expr::New {
            ty: member.returns.clone(),
            args,
            throws: member.throws.clone(),
        });
    }
    let target = match (member.is_static, receiver) {
        (true, _) => {
            CallTarget::Static(env.resolve_type(&member.owner)?)
        }
        (false, Some(receiver)) => CallTarget::Receiver(Box::new(receiver)),
        (false, None) => {
            return Err(SynthesisError::MethodOrConstructorNotFound {
                signature: format!("{}.{} without a receiver", member.owner, member.name),
            })
        }
    };
    Ok(Expr::Call {
        target,
        method: member.name.clone(),
        args,
        throws: member.throws.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SynthesisConfig;
    use crate::hierarchy::{TypeIndex, TypeResolver};
    use crate::schema::Primitive;
    use std::fs;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn java_index() -> TypeIndex {
        let text = fs::read_to_string("tests/java-index.json")
            .expect("Unable to read tests/java-index.json");
        TypeIndex::from_json(&text).unwrap()
    }

    // A -> B -> C -> D -> E, one call per step; none is constructible.
    fn chain_index() -> TypeIndex {
        let class = |name: &str, next: Option<&str>| {
            let methods = match next {
                Some(n) => format!(
                    r#"[{{"name": "to{}", "returns": "t.{}"}}, {{"name": "size", "returns": "int"}}]"#,
                    n, n
                ),
                None => "[]".to_string(),
            };
            format!(
                r#"{{"name": "t.{}", "modifiers": ["public", "abstract"], "methods": {}}}"#,
                name, methods
            )
        };
        let classes = [
            r#"{"name": "java.lang.Object"}"#.to_string(),
            class("A", Some("B")),
            class("B", Some("C")),
            class("C", Some("D")),
            class("D", Some("E")),
            class("E", None),
        ];
        TypeIndex::from_json(&format!(r#"{{"classes": [{}]}}"#, classes.join(","))).unwrap()
    }

    fn index_of(classes: &[&str]) -> TypeIndex {
        let mut all = vec![r#"{"name": "java.lang.Object"}"#];
        all.extend_from_slice(classes);
        TypeIndex::from_json(&format!(r#"{{"classes": [{}]}}"#, all.join(","))).unwrap()
    }

    fn rendered(out: &[Stmt]) -> Vec<String> {
        out.iter()
            .map(|s| match s {
                Stmt::Expr(e) => e.render(),
                other => panic!("unexpected {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_prefers_variable_in_scope() {
        init();
        let index = java_index();
        let mut env = Environment::new(&index, SynthesisConfig::default(), 0);
        let string = env.resolve_type("java.lang.String").unwrap();
        env.add_user_variable("file", string.clone());
        let mut out = Vec::new();
        let found = Enumerator::new(&mut env).search(&string, 1, &mut out).unwrap();
        assert_eq!(found.expr, Expr::Var("file".to_string()));
        assert!(out.is_empty());
        assert_eq!(env.scope().lookup("file").unwrap().ref_count, 1);
    }

    #[test]
    fn test_constructs_and_binds_fresh_variable() {
        init();
        let index = java_index();
        let mut env = Environment::new(&index, SynthesisConfig::default(), 0);
        let string = env.resolve_type("java.lang.String").unwrap();
        env.add_user_variable("file", string);
        let reader = env.resolve_type("java.io.Reader").unwrap();
        let mut out = Vec::new();
        // Reader is abstract and nothing in scope is a Reader
        let err = Enumerator::new(&mut env).search(&reader, 1, &mut out).unwrap_err();
        assert!(matches!(err, SynthesisError::SearchExhausted { .. }));
        assert!(out.is_empty());
        assert!(env.declarations().is_empty());
        let string_reader = env.resolve_type("java.io.StringReader").unwrap();
        let found = Enumerator::new(&mut env)
            .search(&string_reader, 1, &mut out)
            .unwrap();
        assert_eq!(found.expr, Expr::Var("stringReader1".to_string()));
        assert_eq!(out.len(), 1);
        match &out[0] {
            Stmt::Expr(e) => assert_eq!(e.render(), "stringReader1 = new StringReader(file)"),
            other => panic!("unexpected {:?}", other),
        }
        // the fresh variable is reused by the next search
        let again = Enumerator::new(&mut env).search(&reader, 1, &mut out).unwrap();
        assert_eq!(again.expr, Expr::Var("stringReader1".to_string()));
    }

    #[test]
    fn test_generic_target_is_concretized_from_scope() {
        let index = java_index();
        let mut env = Environment::new(&index, SynthesisConfig::default(), 0);
        let string = env.resolve_type("java.lang.String").unwrap();
        env.add_user_variable("file", string);
        let list = env.resolve_type("java.util.ArrayList").unwrap();
        let mut out = Vec::new();
        let found = Enumerator::new(&mut env).search(&list, 1, &mut out).unwrap();
        assert_eq!(found.ty.render(), "ArrayList<String>");
        match &out[0] {
            Stmt::Expr(e) => assert_eq!(e.render(), "arrayList1 = new ArrayList<String>()"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_functional_interface_gets_stub() {
        let index = java_index();
        let mut env = Environment::new(&index, SynthesisConfig::default(), 0);
        let runnable = env.resolve_type("java.lang.Runnable").unwrap();
        let mut out = Vec::new();
        let found = Enumerator::new(&mut env).search(&runnable, 1, &mut out).unwrap();
        assert_eq!(found.expr.render(), "() -> { }");
        assert!(out.is_empty());
        assert!(env.declarations().is_empty());
    }

    #[test]
    fn test_primitive_falls_back_to_bound_literal() {
        let index = java_index();
        let mut env = Environment::new(&index, SynthesisConfig::default(), 0);
        let mut out = Vec::new();
        let found = Enumerator::new(&mut env)
            .search(&Type::boolean(), 1, &mut out)
            .unwrap();
        assert_eq!(found.expr, Expr::Var("b1".to_string()));
        assert_eq!(out[0], Stmt::assign("b1", Expr::Literal("true".to_string())));
    }

    #[test]
    fn test_compose_length_bound() {
        init();
        let index = chain_index();
        let mut env = Environment::new(&index, SynthesisConfig::default(), 0);
        let a = env.resolve_type("t.A").unwrap();
        env.add_user_variable("a", a);
        let d = env.resolve_type("t.D").unwrap();
        let e = env.resolve_type("t.E").unwrap();

        let mut out = Vec::new();
        let found = Enumerator::new(&mut env).search(&d, 1, &mut out).unwrap();
        assert_eq!(found.ty.name(), "t.D");
        match &out[0] {
            Stmt::Expr(expr) => assert_eq!(expr.render(), "d1 = a.toB().toC().toD()"),
            other => panic!("unexpected {:?}", other),
        }

        let mut env = Environment::new(&index, SynthesisConfig::default(), 0);
        let a = env.resolve_type("t.A").unwrap();
        env.add_user_variable("a", a);
        let mut out = Vec::new();
        let err = Enumerator::new(&mut env).search(&e, 1, &mut out).unwrap_err();
        assert!(matches!(err, SynthesisError::SearchExhausted { .. }));
        assert!(index.resolve("t.E").is_ok());
    }

    #[test]
    fn test_chain_cost_counts_arguments() {
        init();
        let index = index_of(&[
            r#"{"name": "t.A", "modifiers": ["public", "abstract"], "methods": [
                {"name": "toB", "returns": "t.B"},
                {"name": "makeD", "params": ["int"], "returns": "t.D"}]}"#,
            r#"{"name": "t.B", "modifiers": ["public", "abstract"], "methods": [
                {"name": "toC", "returns": "t.C"}]}"#,
            r#"{"name": "t.C", "modifiers": ["public", "abstract"], "methods": [
                {"name": "toD", "returns": "t.D"}]}"#,
            r#"{"name": "t.D", "modifiers": ["public", "abstract"]}"#,
        ]);

        // three calls (cost 3) beat one call with an argument (cost 4)
        let mut env = Environment::new(&index, SynthesisConfig::default(), 0);
        let a = env.resolve_type("t.A").unwrap();
        env.add_user_variable("a", a);
        let d = env.resolve_type("t.D").unwrap();
        let mut out = Vec::new();
        Enumerator::new(&mut env).search(&d, 1, &mut out).unwrap();
        assert_eq!(rendered(&out), vec!["d1 = a.toB().toC().toD()"]);

        // without room for the long chain the argument is searched
        let config = SynthesisConfig {
            max_compose_length: 2,
            ..SynthesisConfig::default()
        };
        let mut env = Environment::new(&index, config, 0);
        let a = env.resolve_type("t.A").unwrap();
        env.add_user_variable("a", a);
        let mut out = Vec::new();
        Enumerator::new(&mut env).search(&d, 1, &mut out).unwrap();
        assert_eq!(rendered(&out), vec!["i1 = 0", "d1 = a.makeD(i1)"]);
    }

    #[test]
    fn test_chain_step_arguments_are_searched() {
        let index = index_of(&[
            r#"{"name": "java.lang.String", "modifiers": ["public", "final"]}"#,
            r#"{"name": "t.A", "modifiers": ["public", "abstract"], "methods": [
                {"name": "toB", "returns": "t.B"}]}"#,
            r#"{"name": "t.B", "modifiers": ["public", "abstract"], "methods": [
                {"name": "toC", "params": ["java.lang.String"], "returns": "t.C"}]}"#,
            r#"{"name": "t.C", "modifiers": ["public", "abstract"], "methods": [
                {"name": "toD", "returns": "t.D"}]}"#,
            r#"{"name": "t.D", "modifiers": ["public", "abstract"]}"#,
        ]);
        let mut env = Environment::new(&index, SynthesisConfig::default(), 0);
        let a = env.resolve_type("t.A").unwrap();
        env.add_user_variable("a", a);
        let string = env.resolve_type("java.lang.String").unwrap();
        env.add_user_variable("s", string);
        let d = env.resolve_type("t.D").unwrap();
        let mut out = Vec::new();
        let found = Enumerator::new(&mut env).search(&d, 1, &mut out).unwrap();
        assert_eq!(found.expr, Expr::Var("d1".to_string()));
        assert_eq!(rendered(&out), vec!["d1 = a.toB().toC(s).toD()"]);
        assert_eq!(env.scope().lookup("s").unwrap().ref_count, 1);
    }

    #[test]
    fn test_constructor_with_fewest_parameters_first() {
        let index = index_of(&[
            r#"{"name": "java.lang.String", "modifiers": ["public", "final"]}"#,
            r#"{"name": "t.Box", "constructors": [
                {"params": ["java.lang.String"]},
                {"params": []}]}"#,
        ]);
        let mut env = Environment::new(&index, SynthesisConfig::default(), 0);
        let string = env.resolve_type("java.lang.String").unwrap();
        env.add_user_variable("file", string);
        let boxed = env.resolve_type("t.Box").unwrap();
        let mut out = Vec::new();
        Enumerator::new(&mut env).search(&boxed, 1, &mut out).unwrap();
        assert_eq!(rendered(&out), vec!["box1 = new Box()"]);
        assert_eq!(env.scope().lookup("file").unwrap().ref_count, 0);
    }

    #[test]
    fn test_argument_depth_bound() {
        let index = java_index();
        let config = SynthesisConfig::default();
        let mut env = Environment::new(&index, config.clone(), 0);
        let int = Type::primitive(Primitive::Int);
        let mut out = Vec::new();
        let err = Enumerator::new(&mut env)
            .search(&int, config.max_argument_depth + 1, &mut out)
            .unwrap_err();
        assert!(matches!(err, SynthesisError::SearchExhausted { .. }));
    }
}
