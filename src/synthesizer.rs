use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::enumerator::{invocation, Enumerator};
use crate::environment::Environment;
use crate::error::SynthesisError;
use crate::hierarchy::{common_superclass, most_specific_first, OBJECT};
use crate::java::{Body, Catch, Expr, Stmt};
use crate::parser::{signature, Signature};
use crate::postprocess;
use crate::schema::{ClassInfo, MethodInfo, TypeExpr};
use crate::sketches::{ApiCall, Sketch};
use crate::types::{BoundMember, Type};

/// Depth at which receivers and arguments of sketch calls are searched.
const CALL_ARGUMENT_DEPTH: usize = 1;

/// Interprets a sketch against one environment.
pub struct Synthesizer<'e, 'r> {
    env: &'e mut Environment<'r>,
    /// Checked exceptions of every resolved API call, by signature.
    thrown_by: HashMap<String, Vec<String>>,
    /// Variables assigned the result of a sketch API call.
    results: BTreeSet<String>,
}

/// A sketch call resolved against the type index.
enum Resolved {
    Constructor(BoundMember),
    Method {
        declared_in: String,
        method: MethodInfo,
        owner: Type,
    },
}

impl<'e, 'r> Synthesizer<'e, 'r> {
    pub fn new(env: &'e mut Environment<'r>) -> Self {
        Synthesizer {
            env,
            thrown_by: HashMap::new(),
            results: BTreeSet::new(),
        }
    }

    pub fn thrown_by(&self) -> &HashMap<String, Vec<String>> {
        &self.thrown_by
    }

    pub fn results(&self) -> &BTreeSet<String> {
        &self.results
    }

    pub fn synthesize(&mut self, sketch: &Sketch) -> Result<Vec<Stmt>, SynthesisError> {
        match sketch {
            Sketch::ApiCall(call) => self.api_call(call),
            Sketch::Branch {
                cond,
                then_arm,
                else_arm,
            } => self.branch(cond, then_arm, else_arm),
            Sketch::Loop { cond, body } => self.repeat(cond, body),
            Sketch::Except { try_arm, catch_arm } => self.except(try_arm, catch_arm),
            Sketch::SubTree { items } => self.sequence(items),
        }
    }

    fn sequence(&mut self, items: &[Sketch]) -> Result<Vec<Stmt>, SynthesisError> {
        let mut out = Vec::new();
        for item in items {
            out.extend(self.synthesize(item)?);
        }
        Ok(out)
    }

    fn api_call(&mut self, call: &ApiCall) -> Result<Vec<Stmt>, SynthesisError> {
        let mut out = Vec::new();
        let (expr, ty) = self.call_expression(call, &mut out)?;
        if ty.is_void() {
            out.push(Stmt::Expr(expr));
        } else {
            let name = self.env.declare_fresh(&ty);
            out.push(Stmt::assign(&name, expr));
            self.results.insert(name);
        }
        Ok(out)
    }

    /// The expression invoking `call` and its type. Receivers and arguments
    /// that had to be built are bound in `out` first.
    fn call_expression(
        &mut self,
        call: &ApiCall,
        out: &mut Vec<Stmt>,
    ) -> Result<(Expr, Type), SynthesisError> {
        log::debug!("line {}: {}", call.source_line, call.signature);
        let member = match self.resolve(call)? {
            Resolved::Constructor(member) => member,
            Resolved::Method {
                declared_in,
                method,
                owner,
            } => {
                let resolver = self.env.resolver();
                if method.modifiers.is_static {
                    owner.bind_method(&declared_in, &method, resolver)?
                } else {
                    let receiver = Enumerator::new(self.env).search(&owner, CALL_ARGUMENT_DEPTH, out)?;
                    let member = receiver.ty.bind_method(&declared_in, &method, resolver)?;
                    return self.finish_call(call, member, Some(receiver.expr), out);
                }
            }
        };
        self.finish_call(call, member, None, out)
    }

    fn finish_call(
        &mut self,
        call: &ApiCall,
        member: BoundMember,
        receiver: Option<Expr>,
        out: &mut Vec<Stmt>,
    ) -> Result<(Expr, Type), SynthesisError> {
        let args = Enumerator::new(self.env).arguments(&member.params, CALL_ARGUMENT_DEPTH, out)?;
        self.thrown_by
            .insert(call.signature.clone(), member.throws.clone());
        let expr = invocation(self.env, &member, receiver, args)?;
        Ok((expr, member.returns))
    }

    fn resolve(&mut self, call: &ApiCall) -> Result<Resolved, SynthesisError> {
        let sig = signature(&call.signature)?;
        let resolver = self.env.resolver();
        let qualified = sig.qualified_name();
        if let Ok(class) = resolver.resolve(&qualified) {
            return self.resolve_constructor(&sig, class).map(Resolved::Constructor);
        }
        let owner_class = match sig.owner_name().map(|o| resolver.resolve(&o)) {
            Some(Ok(class)) => class,
            _ => return Err(SynthesisError::class_not_found(qualified)),
        };
        let owner_ty = self.class_type(owner_class.clone(), sig.method_class_args())?;
        let (declared_in, method) = self.find_method(&owner_class, &sig).ok_or_else(|| {
            SynthesisError::MethodOrConstructorNotFound {
                signature: call.signature.clone(),
            }
        })?;
        Ok(Resolved::Method {
            declared_in,
            method,
            owner: owner_ty,
        })
    }

    fn resolve_constructor(
        &mut self,
        sig: &Signature,
        class: Arc<ClassInfo>,
    ) -> Result<BoundMember, SynthesisError> {
        let not_found = || SynthesisError::MethodOrConstructorNotFound {
            signature: format!("{}({})", class.name, render_params(&sig.params)),
        };
        if !class.is_instantiable() {
            return Err(not_found());
        }
        let ctor = class
            .constructors
            .iter()
            .find(|c| c.modifiers.public && params_match(&sig.params, &c.params))
            .ok_or_else(not_found)?;
        let mut ty = self.class_type(class.clone(), sig.constructor_class_args())?;
        if ty.is_free_generic() {
            ty = Enumerator::new(self.env).concretize(&ty)?;
        }
        ty.bind_constructor(ctor, self.env.resolver())
    }

    /// The class type, parameterized by the arguments written in the sketch
    /// when they are all concrete.
    fn class_type(&mut self, class: Arc<ClassInfo>, args: &[TypeExpr]) -> Result<Type, SynthesisError> {
        if args.is_empty() || args.iter().any(TypeExpr::is_open) {
            return Ok(Type::class(class));
        }
        let resolver = self.env.resolver();
        let args = args
            .iter()
            .map(|a| Type::from_expr(a, &Default::default(), resolver))
            .collect::<Result<Vec<_>, _>>()?;
        Type::concretized(class, args)
    }

    // breadth first, so the most derived declaration wins
    fn find_method(&self, owner: &Arc<ClassInfo>, sig: &Signature) -> Option<(String, MethodInfo)> {
        let resolver = self.env.resolver();
        let mut queue = VecDeque::from([owner.clone()]);
        let mut seen = HashSet::new();
        while let Some(class) = queue.pop_front() {
            if !seen.insert(class.name.clone()) {
                continue;
            }
            let found = class.methods.iter().find(|m| {
                m.modifiers.public
                    && m.name == sig.member_name()
                    && params_match(&sig.params, &m.params)
            });
            if let Some(m) = found {
                return Some((class.name.clone(), m.clone()));
            }
            let mut parents: Vec<String> = class
                .supertypes()
                .filter_map(|t| match t {
                    TypeExpr::Class { name, .. } => Some(name.clone()),
                    _ => None,
                })
                .collect();
            if class.superclass.is_none() && class.name != OBJECT {
                parents.push(OBJECT.to_string());
            }
            queue.extend(parents.iter().filter_map(|p| resolver.resolve(p).ok()));
        }
        None
    }

    /// Builds the condition of a branch or loop. Void calls run before the
    /// test; the others are compared against their type's empty value and
    /// conjoined.
    fn condition(&mut self, cond: &[ApiCall], out: &mut Vec<Stmt>) -> Result<Expr, SynthesisError> {
        let mut tests = Vec::new();
        for call in cond {
            let (expr, ty) = self.call_expression(call, out)?;
            if ty.is_void() {
                out.push(Stmt::Expr(expr));
            } else if ty.is_boolean() {
                tests.push(expr);
            } else if ty.as_primitive().map_or(false, |p| p.is_numeric()) {
                tests.push(Expr::binary("!=", expr, Expr::Literal("0".to_string())));
            } else {
                tests.push(Expr::binary("!=", expr, Expr::Literal("null".to_string())));
            }
        }
        let mut tests = tests.into_iter();
        match tests.next() {
            Some(first) => Ok(tests.fold(first, |acc, t| Expr::binary("&&", acc, t))),
            None => {
                let flag = Enumerator::new(self.env).search(&Type::boolean(), CALL_ARGUMENT_DEPTH, out)?;
                Ok(flag.expr)
            }
        }
    }

    fn branch(
        &mut self,
        cond: &[ApiCall],
        then_arm: &[Sketch],
        else_arm: &[Sketch],
    ) -> Result<Vec<Stmt>, SynthesisError> {
        let mut out = Vec::new();
        let cond = self.condition(cond, &mut out)?;

        self.env.push_scope();
        let then_stmts = self.sequence(then_arm)?;
        let then_scope = self.env.pop_scope();

        self.env.push_scope();
        let else_stmts = self.sequence(else_arm)?;
        let else_scope = self.env.pop_scope();

        self.env.join(vec![then_scope, else_scope]);
        out.push(Stmt::If {
            cond,
            then_arm: then_stmts,
            else_arm: else_stmts,
        });
        Ok(out)
    }

    // The body may run zero times, so it is joined with the scope before it.
    fn repeat(&mut self, cond: &[ApiCall], body: &[Sketch]) -> Result<Vec<Stmt>, SynthesisError> {
        let mut out = Vec::new();
        let cond = self.condition(cond, &mut out)?;
        let zero_iterations = self.env.scope().clone();

        self.env.push_scope();
        let body_stmts = self.sequence(body)?;
        let body_scope = self.env.pop_scope();

        self.env.join(vec![body_scope, zero_iterations]);
        out.push(Stmt::While {
            cond,
            body: body_stmts,
        });
        Ok(out)
    }

    fn except(&mut self, try_arm: &[Sketch], catch_arm: &[Sketch]) -> Result<Vec<Stmt>, SynthesisError> {
        self.env.push_scope();
        let try_stmts = self.sequence(try_arm)?;
        let try_scope = self.env.pop_scope();

        let exceptions: BTreeSet<String> = Sketch::uncovered_in(try_arm)
            .into_iter()
            .filter_map(|c| self.thrown_by.get(&c.signature))
            .flatten()
            .cloned()
            .collect();
        if exceptions.is_empty() {
            return Err(SynthesisError::malformed(
                "try arm throws no checked exception",
            ));
        }
        let resolver = self.env.resolver();
        let ordered = most_specific_first(&exceptions, resolver);
        log::debug!("catching {:?}", ordered);

        // one body, shared by every clause, typed by what all clauses have in common
        let shared = self.env.resolve_type(&common_superclass(&ordered, resolver))?;
        self.env.push_scope();
        let var = self.env.bind_catch_variable(&shared);
        let catch_body = self.sequence(catch_arm)?;
        let catch_scope = self.env.pop_scope();

        let mut catches = Vec::with_capacity(ordered.len());
        for name in &ordered {
            catches.push(Catch {
                exception: self.env.resolve_type(name)?,
                var: var.clone(),
                body: catch_body.clone(),
            });
        }
        self.env.join(vec![try_scope, catch_scope]);
        Ok(vec![Stmt::Try {
            body: try_stmts,
            catches,
        }])
    }
}

fn params_match(written: &[TypeExpr], declared: &[TypeExpr]) -> bool {
    written.len() == declared.len()
        && written
            .iter()
            .zip(declared)
            .all(|(w, d)| w.matches_declared(d))
}

fn render_params(params: &[TypeExpr]) -> String {
    params
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Synthesizes a complete method body for `sketch`: interprets it, catches
/// the checked exceptions no `Except` node handles, then removes dead
/// constructions.
pub fn synthesize(sketch: &Sketch, env: &mut Environment) -> Result<Body, SynthesisError> {
    let mut synthesizer = Synthesizer::new(env);
    let statements = synthesizer.synthesize(sketch)?;
    let Synthesizer {
        env,
        thrown_by,
        results,
    } = synthesizer;

    let uncaught = postprocess::uncaught_exceptions(sketch, &thrown_by);
    let statements = postprocess::wrap_exceptions(statements, &uncaught, env)?;
    let body = Body {
        declarations: env.declarations().to_vec(),
        statements,
    };
    let body = postprocess::eliminate_dead_code(body, &results, env);
    log::debug!("{} classes referenced", body.referenced_classes().len());
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SynthesisConfig;
    use crate::hierarchy::TypeIndex;
    use std::fs;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn java_index() -> TypeIndex {
        let text = fs::read_to_string("tests/java-index.json")
            .expect("Unable to read tests/java-index.json");
        TypeIndex::from_json(&text).unwrap()
    }

    fn env_with_file(index: &TypeIndex) -> Environment<'_> {
        let mut env = Environment::new(index, SynthesisConfig::default(), 0);
        let string = env.resolve_type("java.lang.String").unwrap();
        env.add_user_variable("file", string);
        env
    }

    fn render(stmts: &[Stmt]) -> String {
        Body {
            declarations: vec![],
            statements: stmts.to_vec(),
        }
        .render("  ", 0)
    }

    #[test]
    fn test_api_calls_chain_through_fresh_variables() {
        init();
        let index = java_index();
        let mut env = env_with_file(&index);
        let sketch = Sketch::subtree(vec![
            Sketch::call("java.io.FileReader(java.lang.String)"),
            Sketch::call("java.io.BufferedReader(java.io.Reader)"),
            Sketch::call("java.io.BufferedReader.readLine()"),
        ]);
        let mut synthesizer = Synthesizer::new(&mut env);
        let stmts = synthesizer.synthesize(&sketch).unwrap();
        assert_eq!(
            render(&stmts),
            "\
fileReader1 = new FileReader(file);
bufferedReader1 = new BufferedReader(fileReader1);
string1 = bufferedReader1.readLine();
"
        );
        assert_eq!(
            synthesizer.thrown_by()["java.io.FileReader(java.lang.String)"],
            vec!["java.io.FileNotFoundException".to_string()]
        );
        assert!(synthesizer.thrown_by()["java.io.BufferedReader(java.io.Reader)"].is_empty());
        assert_eq!(synthesizer.results().len(), 3);
    }

    #[test]
    fn test_unknown_members() {
        let index = java_index();
        let mut env = env_with_file(&index);
        let err = Synthesizer::new(&mut env)
            .synthesize(&Sketch::call("java.io.BufferedReader.readAll()"))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::MethodOrConstructorNotFound { .. }));
        let err = Synthesizer::new(&mut env)
            .synthesize(&Sketch::call("org.example.Missing.run()"))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::ClassNotFound { .. }));
        let err = Synthesizer::new(&mut env)
            .synthesize(&Sketch::call("java.io.Reader()"))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::MethodOrConstructorNotFound { .. }));
    }

    #[test]
    fn test_generic_placeholder_takes_receiver_type() {
        let index = java_index();
        let mut env = env_with_file(&index);
        let sketch = Sketch::subtree(vec![
            Sketch::call("java.util.ArrayList()"),
            Sketch::call("java.util.List.add(Tau_E)"),
        ]);
        let stmts = Synthesizer::new(&mut env).synthesize(&sketch).unwrap();
        assert_eq!(
            render(&stmts),
            "\
arrayList1 = new ArrayList<String>();
b1 = arrayList1.add(file);
"
        );
    }

    #[test]
    fn test_branch_variable_is_not_visible_after_join() {
        init();
        let index = java_index();
        let mut env = env_with_file(&index);
        let sketch = Sketch::subtree(vec![
            Sketch::call("java.io.StringReader(java.lang.String)"),
            Sketch::Branch {
                cond: vec![ApiCall::new("java.lang.String.isEmpty()")],
                then_arm: vec![Sketch::call("java.io.BufferedReader(java.io.Reader)")],
                else_arm: vec![],
            },
            Sketch::call("java.io.BufferedReader.readLine()"),
        ]);
        let stmts = Synthesizer::new(&mut env).synthesize(&sketch).unwrap();
        // bufferedReader1 is a phantom after the branch; readLine needs its own
        assert_eq!(
            render(&stmts),
            "\
stringReader1 = new StringReader(file);
if (file.isEmpty()) {
  bufferedReader1 = new BufferedReader(stringReader1);
}
bufferedReader2 = new BufferedReader(stringReader1);
string1 = bufferedReader2.readLine();
"
        );
        assert!(env.scope().is_phantom("bufferedReader1"));
    }

    #[test]
    fn test_loop_condition_and_body() {
        let index = java_index();
        let mut env = env_with_file(&index);
        let sketch = Sketch::subtree(vec![
            Sketch::call("java.io.StringReader(java.lang.String)"),
            Sketch::call("java.io.BufferedReader(java.io.Reader)"),
            Sketch::Loop {
                cond: vec![ApiCall::new("java.io.BufferedReader.ready()")],
                body: vec![Sketch::call("java.io.BufferedReader.readLine()")],
            },
        ]);
        let stmts = Synthesizer::new(&mut env).synthesize(&sketch).unwrap();
        assert_eq!(
            render(&stmts),
            "\
stringReader1 = new StringReader(file);
bufferedReader1 = new BufferedReader(stringReader1);
while (bufferedReader1.ready()) {
  string1 = bufferedReader1.readLine();
}
"
        );
        assert!(env.scope().is_phantom("string1"));
    }

    #[test]
    fn test_empty_condition_searches_boolean() {
        let index = java_index();
        let mut env = Environment::new(&index, SynthesisConfig::default(), 0);
        let sketch = Sketch::Loop {
            cond: vec![],
            body: vec![],
        };
        let stmts = Synthesizer::new(&mut env).synthesize(&sketch).unwrap();
        assert_eq!(render(&stmts), "b1 = true;\nwhile (b1) {\n}\n");

        // a live String offers a composed test instead
        let mut env = env_with_file(&index);
        let stmts = Synthesizer::new(&mut env).synthesize(&sketch).unwrap();
        assert_eq!(render(&stmts), "b1 = file.isEmpty();\nwhile (b1) {\n}\n");
    }

    #[test]
    fn test_except_orders_catch_clauses() {
        init();
        let index = java_index();
        let mut env = env_with_file(&index);
        let sketch = Sketch::Except {
            try_arm: vec![
                Sketch::call("java.io.FileReader(java.lang.String)"),
                Sketch::call("java.io.BufferedReader(java.io.Reader)"),
                Sketch::call("java.io.BufferedReader.readLine()"),
            ],
            catch_arm: vec![Sketch::call("java.lang.Throwable.getMessage()")],
        };
        let stmts = Synthesizer::new(&mut env).synthesize(&sketch).unwrap();
        let catches = match &stmts[0] {
            Stmt::Try { catches, .. } => catches,
            other => panic!("expected try, got {:?}", other),
        };
        let order: Vec<String> = catches.iter().map(|c| c.exception.name()).collect();
        assert_eq!(
            order,
            vec!["java.io.FileNotFoundException", "java.io.IOException"]
        );
        // the shared catch body reads the catch variable
        assert_eq!(
            render(&catches[1].body),
            format!("string1 = {}.getMessage();\n", catches[1].var)
        );
        assert!(env.scope().lookup(&catches[0].var).is_none());
    }

    #[test]
    fn test_except_without_checked_exception_is_malformed() {
        let index = java_index();
        let mut env = env_with_file(&index);
        let sketch = Sketch::Except {
            try_arm: vec![Sketch::call("java.lang.String.isEmpty()")],
            catch_arm: vec![],
        };
        let err = Synthesizer::new(&mut env).synthesize(&sketch).unwrap_err();
        assert!(matches!(err, SynthesisError::MalformedSketch { .. }));
    }
}
