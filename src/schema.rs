use core::fmt;
use std::fmt::Debug;

use serde::Deserialize;

#[derive(PartialEq, Eq, Hash, Clone, Copy)]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl Primitive {
    pub fn from_name(name: &str) -> Option<Primitive> {
        Some(match name {
            "boolean" => Primitive::Boolean,
            "byte" => Primitive::Byte,
            "char" => Primitive::Char,
            "short" => Primitive::Short,
            "int" => Primitive::Int,
            "long" => Primitive::Long,
            "float" => Primitive::Float,
            "double" => Primitive::Double,
            "void" => Primitive::Void,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Char => "char",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Void => "void",
        }
    }

    /// The wrapper class used for autoboxing.
    pub fn boxed(&self) -> Option<&'static str> {
        Some(match self {
            Primitive::Boolean => "java.lang.Boolean",
            Primitive::Byte => "java.lang.Byte",
            Primitive::Char => "java.lang.Character",
            Primitive::Short => "java.lang.Short",
            Primitive::Int => "java.lang.Integer",
            Primitive::Long => "java.lang.Long",
            Primitive::Float => "java.lang.Float",
            Primitive::Double => "java.lang.Double",
            Primitive::Void => return None,
        })
    }

    pub fn unboxed(class_name: &str) -> Option<Primitive> {
        [
            Primitive::Boolean,
            Primitive::Byte,
            Primitive::Char,
            Primitive::Short,
            Primitive::Int,
            Primitive::Long,
            Primitive::Float,
            Primitive::Double,
        ]
        .into_iter()
        .find(|p| p.boxed() == Some(class_name))
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Primitive::Boolean | Primitive::Void)
    }

    /// Widening primitive conversion (JLS 5.1.2), identity included.
    pub fn widens_to(&self, other: &Primitive) -> bool {
        use Primitive::*;
        if self == other {
            return true;
        }
        match self {
            Byte => matches!(other, Short | Int | Long | Float | Double),
            Short => matches!(other, Int | Long | Float | Double),
            Char => matches!(other, Int | Long | Float | Double),
            Int => matches!(other, Long | Float | Double),
            Long => matches!(other, Float | Double),
            Float => matches!(other, Double),
            _ => false,
        }
    }

    /// A non-constant-foldable placeholder value once bound to a local.
    pub fn default_literal(&self) -> Option<&'static str> {
        Some(match self {
            Primitive::Boolean => "true",
            Primitive::Char => "'a'",
            Primitive::Long => "0L",
            Primitive::Float => "0.0f",
            Primitive::Double => "0.0",
            Primitive::Byte | Primitive::Short | Primitive::Int => "0",
            Primitive::Void => return None,
        })
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// A type as written in a signature or in the type index, before resolution.
#[derive(PartialEq, Eq, Hash, Clone)]
pub enum TypeExpr {
    Primitive(Primitive),
    Class { name: String, args: Vec<TypeExpr> },
    /// A type variable declared by the enclosing class or method.
    Var(String),
    /// The model's `Tau_X` marker standing for some generic parameter.
    Placeholder(String),
    /// `?` or `? extends Bound`.
    Wildcard(Option<Box<TypeExpr>>),
    /// `? super Bound`.
    SuperWildcard(Box<TypeExpr>),
    Array(Box<TypeExpr>),
}

impl TypeExpr {
    pub fn class(name: &str) -> TypeExpr {
        TypeExpr::Class {
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    /// Rewrites single-segment class names that match a declared type
    /// parameter into `Var`s.
    pub fn bind_vars(self, vars: &[&str]) -> TypeExpr {
        match self {
            TypeExpr::Class { name, args } => {
                if args.is_empty() && vars.contains(&name.as_str()) {
                    TypeExpr::Var(name)
                } else {
                    TypeExpr::Class {
                        name,
                        args: args.into_iter().map(|a| a.bind_vars(vars)).collect(),
                    }
                }
            }
            TypeExpr::Wildcard(Some(bound)) => {
                TypeExpr::Wildcard(Some(Box::new(bound.bind_vars(vars))))
            }
            TypeExpr::SuperWildcard(bound) => TypeExpr::SuperWildcard(Box::new(bound.bind_vars(vars))),
            TypeExpr::Array(elem) => TypeExpr::Array(Box::new(elem.bind_vars(vars))),
            other => other,
        }
    }

    /// Mentions any type variable or placeholder.
    pub fn is_open(&self) -> bool {
        match self {
            TypeExpr::Var(_) | TypeExpr::Placeholder(_) => true,
            TypeExpr::Class { args, .. } => args.iter().any(TypeExpr::is_open),
            TypeExpr::Wildcard(bound) => bound.as_ref().map_or(false, |b| b.is_open()),
            TypeExpr::SuperWildcard(bound) => bound.is_open(),
            TypeExpr::Array(elem) => elem.is_open(),
            TypeExpr::Primitive(_) => false,
        }
    }

    /// Matches a sketch parameter against a declared parameter: placeholders
    /// stand for declared type variables, class names compare erased.
    pub fn matches_declared(&self, declared: &TypeExpr) -> bool {
        match (self, declared) {
            (TypeExpr::Placeholder(_), TypeExpr::Var(_)) => true,
            (TypeExpr::Placeholder(_), TypeExpr::Wildcard(_) | TypeExpr::SuperWildcard(_)) => true,
            (TypeExpr::Primitive(a), TypeExpr::Primitive(b)) => a == b,
            (TypeExpr::Class { name: a, .. }, TypeExpr::Class { name: b, .. }) => a == b,
            (TypeExpr::Class { name, .. }, TypeExpr::Var(_)) => name == "java.lang.Object",
            (TypeExpr::Array(a), TypeExpr::Array(b)) => a.matches_declared(b),
            _ => false,
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypeExpr::Primitive(p) => write!(f, "{}", p),
            TypeExpr::Class { name, args } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{}", a)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            TypeExpr::Var(name) => write!(f, "{}", name),
            TypeExpr::Placeholder(name) => write!(f, "Tau_{}", name),
            TypeExpr::Wildcard(None) => write!(f, "?"),
            TypeExpr::Wildcard(Some(b)) => write!(f, "? extends {}", b),
            TypeExpr::SuperWildcard(b) => write!(f, "? super {}", b),
            TypeExpr::Array(elem) => write!(f, "{}[]", elem),
        }
    }
}

impl Debug for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Default, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct Modifiers {
    pub public: bool,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
    pub interface: bool,
    pub default: bool,
}

impl Modifiers {
    pub fn public() -> Modifiers {
        Modifiers {
            public: true,
            ..Modifiers::default()
        }
    }
}

impl From<Vec<String>> for Modifiers {
    fn from(words: Vec<String>) -> Self {
        let mut m = Modifiers::default();
        for w in words {
            match w.as_str() {
                "public" => m.public = true,
                "static" => m.is_static = true,
                "abstract" => m.is_abstract = true,
                "final" => m.is_final = true,
                "interface" => m.interface = true,
                "default" => m.default = true,
                other => log::debug!("ignoring modifier {}", other),
            }
        }
        m
    }
}

impl Debug for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let flags = [
            (self.public, "public"),
            (self.is_static, "static"),
            (self.is_abstract, "abstract"),
            (self.is_final, "final"),
            (self.interface, "interface"),
            (self.default, "default"),
        ];
        let words: Vec<&str> = flags.iter().filter(|(on, _)| *on).map(|(_, w)| *w).collect();
        write!(f, "[{}]", words.join(" "))
    }
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct TypeParam {
    pub name: String,
    pub bounds: Vec<TypeExpr>,
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ConstructorInfo {
    pub params: Vec<TypeExpr>,
    pub throws: Vec<String>,
    pub modifiers: Modifiers,
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct MethodInfo {
    pub name: String,
    pub params: Vec<TypeExpr>,
    pub returns: TypeExpr,
    pub throws: Vec<String>,
    pub type_params: Vec<TypeParam>,
    pub modifiers: Modifiers,
}

impl MethodInfo {
    /// Abstract for the purpose of functional-interface detection.
    pub fn is_abstract(&self, in_interface: bool) -> bool {
        if self.modifiers.is_static || self.modifiers.default {
            return false;
        }
        self.modifiers.is_abstract || in_interface
    }
}

/// Capability descriptor of one class: what the resolver hands out.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ClassInfo {
    pub name: String,
    pub modifiers: Modifiers,
    pub superclass: Option<TypeExpr>,
    pub interfaces: Vec<TypeExpr>,
    pub type_params: Vec<TypeParam>,
    pub constructors: Vec<ConstructorInfo>,
    pub methods: Vec<MethodInfo>,
}

impl ClassInfo {
    pub fn simple_name(&self) -> String {
        simple_name(&self.name)
    }

    pub fn package(&self) -> &str {
        package_of(&self.name)
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    pub fn is_instantiable(&self) -> bool {
        !self.modifiers.interface && !self.modifiers.is_abstract
    }

    pub fn supertypes(&self) -> impl Iterator<Item = &TypeExpr> {
        self.superclass.iter().chain(self.interfaces.iter())
    }
}

/// `java.util.Map$Entry` renders as `Map.Entry`.
pub fn simple_name(qualified: &str) -> String {
    let last = match qualified.rfind('.') {
        Some(i) => &qualified[i + 1..],
        None => qualified,
    };
    last.replace('$', ".")
}

pub fn package_of(qualified: &str) -> &str {
    match qualified.rfind('.') {
        Some(i) => &qualified[..i],
        None => "",
    }
}

/// The class an `import` line must name: nested classes import their
/// outermost class.
pub fn import_name(qualified: &str) -> &str {
    match qualified.find('$') {
        Some(i) => &qualified[..i],
        None => qualified,
    }
}

// Wire form of the type index.

#[derive(Deserialize)]
pub(crate) struct RawIndex {
    pub classes: Vec<RawClass>,
}

#[derive(Deserialize)]
pub(crate) struct RawClass {
    pub name: String,
    #[serde(default = "Modifiers::public")]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub type_params: Vec<RawTypeParam>,
    #[serde(default)]
    pub constructors: Vec<RawConstructor>,
    #[serde(default)]
    pub methods: Vec<RawMethod>,
}

#[derive(Deserialize)]
pub(crate) struct RawTypeParam {
    pub name: String,
    #[serde(default)]
    pub bounds: Vec<String>,
}

#[derive(Deserialize)]
pub(crate) struct RawConstructor {
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub throws: Vec<String>,
    #[serde(default = "Modifiers::public")]
    pub modifiers: Modifiers,
}

#[derive(Deserialize)]
pub(crate) struct RawMethod {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default = "default_return")]
    pub returns: String,
    #[serde(default)]
    pub throws: Vec<String>,
    #[serde(default)]
    pub type_params: Vec<RawTypeParam>,
    #[serde(default = "Modifiers::public")]
    pub modifiers: Modifiers,
}

fn default_return() -> String {
    "void".to_string()
}
