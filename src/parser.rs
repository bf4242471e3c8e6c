use crate::error::SynthesisError;
use crate::schema::{Primitive, TypeExpr};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{anychar, char, multispace0, multispace1, none_of},
    combinator::{all_consuming, map, opt, recognize, verify},
    multi::{many0, many1, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

// The grammars used by the engine:
//
// signature    = segment ("." segment)* "(" [type_expr ("," type_expr)*] ")"
// segment      = identifier [type_args]
// type_expr    = (wildcard | placeholder | named) ("[]")*
// placeholder  = "Tau_" identifier
// named        = identifier ("." identifier)* [type_args]
// type_args    = "<" type_expr ("," type_expr)* ">"
// wildcard     = "?" [("extends" | "super") type_expr]
//
// hole         = "{" evidence+ "}"
// evidence     = qualified_name "(" [string ("," string)*] ")" ";"   (second to last segment is `Evidence`)
// parameters   = "(" [parameter ("," parameter)*] ")"
// parameter    = ("final" | annotation)* type_expr identifier

pub const PLACEHOLDER_PREFIX: &str = "Tau_";
pub const EVIDENCE_CLASS: &str = "Evidence";

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(take_while1(is_ident_start), take_while(is_ident_char)))(input)
}

pub fn parse_qualified_name(input: &str) -> IResult<&str, &str> {
    recognize(separated_list1(char('.'), parse_identifier))(input)
}

fn parse_type_args(input: &str) -> IResult<&str, Vec<TypeExpr>> {
    delimited(
        ws(char('<')),
        separated_list1(ws(char(',')), parse_type_expr),
        preceded(multispace0, char('>')),
    )(input)
}

fn parse_wildcard(input: &str) -> IResult<&str, TypeExpr> {
    map(
        preceded(
            char('?'),
            opt(pair(
                ws(alt((tag("extends"), tag("super")))),
                parse_type_expr,
            )),
        ),
        |bound| match bound {
            Some(("super", t)) => TypeExpr::SuperWildcard(Box::new(t)),
            Some((_, t)) => TypeExpr::Wildcard(Some(Box::new(t))),
            None => TypeExpr::Wildcard(None),
        },
    )(input)
}

fn parse_placeholder(input: &str) -> IResult<&str, TypeExpr> {
    map(preceded(tag(PLACEHOLDER_PREFIX), parse_identifier), |name| {
        TypeExpr::Placeholder(name.to_string())
    })(input)
}

fn parse_named_type(input: &str) -> IResult<&str, TypeExpr> {
    map(
        pair(parse_qualified_name, opt(parse_type_args)),
        |(name, args)| match (Primitive::from_name(name), args) {
            (Some(p), None) => TypeExpr::Primitive(p),
            (_, args) => TypeExpr::Class {
                name: name.to_string(),
                args: args.unwrap_or_default(),
            },
        },
    )(input)
}

pub fn parse_type_expr(input: &str) -> IResult<&str, TypeExpr> {
    let (input, base) = alt((parse_wildcard, parse_placeholder, parse_named_type))(input)?;
    let (input, dims) = many0(pair(multispace0, tag("[]")))(input)?;
    let ty = dims
        .into_iter()
        .fold(base, |t, _| TypeExpr::Array(Box::new(t)));
    Ok((input, ty))
}

/// Parses a complete type expression such as `java.util.Map<K, java.util.List<V>>`.
pub fn type_expr(text: &str) -> Result<TypeExpr, String> {
    all_consuming(ws(parse_type_expr))(text)
        .map(|(_, t)| t)
        .map_err(|e| format!("bad type expression `{}`: {}", text, e))
}

/// A parsed API call signature. Whether the last segment names a method or the
/// class itself is decided against the type index.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Signature {
    pub segments: Vec<(String, Vec<TypeExpr>)>,
    pub params: Vec<TypeExpr>,
}

impl Signature {
    /// `a.b.C` for `a.b.C(...)`; also the candidate class of a constructor.
    pub fn qualified_name(&self) -> String {
        join_segments(&self.segments)
    }

    /// `a.b.C` for `a.b.C.m(...)`.
    pub fn owner_name(&self) -> Option<String> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(join_segments(&self.segments[..self.segments.len() - 1]))
    }

    pub fn member_name(&self) -> &str {
        self.segments
            .last()
            .map(|(name, _)| name.as_str())
            .unwrap_or_default()
    }

    /// Type arguments written on the class when read as a constructor.
    pub fn constructor_class_args(&self) -> &[TypeExpr] {
        self.segments
            .last()
            .map(|(_, args)| args.as_slice())
            .unwrap_or_default()
    }

    /// Type arguments written on the class when read as a method call.
    pub fn method_class_args(&self) -> &[TypeExpr] {
        if self.segments.len() < 2 {
            return &[];
        }
        &self.segments[self.segments.len() - 2].1
    }
}

fn join_segments(segments: &[(String, Vec<TypeExpr>)]) -> String {
    segments
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

fn parse_segment(input: &str) -> IResult<&str, (String, Vec<TypeExpr>)> {
    pair(
        map(parse_identifier, str::to_string),
        map(opt(parse_type_args), Option::unwrap_or_default),
    )(input)
}

pub fn parse_signature(input: &str) -> IResult<&str, Signature> {
    map(
        pair(
            separated_list1(char('.'), parse_segment),
            delimited(
                ws(char('(')),
                separated_list0(ws(char(',')), parse_type_expr),
                preceded(multispace0, char(')')),
            ),
        ),
        |(segments, params)| Signature { segments, params },
    )(input)
}

pub fn signature(text: &str) -> Result<Signature, SynthesisError> {
    all_consuming(ws(parse_signature))(text)
        .map(|(_, s)| s)
        .map_err(|e| SynthesisError::malformed(format!("bad signature `{}`: {}", text, e)))
}

fn parse_string_literal(input: &str) -> IResult<&str, &str> {
    delimited(
        char('"'),
        recognize(many0(alt((
            recognize(pair(char('\\'), anychar)),
            recognize(none_of("\"\\")),
        )))),
        char('"'),
    )(input)
}

/// One evidence statement, e.g. `Evidence.apicalls("readLine");`. Returns the
/// evidence kind and its literal arguments.
pub fn parse_evidence_call(input: &str) -> IResult<&str, (&str, Vec<&str>)> {
    let marker = verify(parse_qualified_name, |name: &str| {
        let mut parts = name.rsplit('.');
        parts.next().is_some() && parts.next() == Some(EVIDENCE_CLASS)
    });
    map(
        terminated(
            pair(
                marker,
                delimited(
                    ws(char('(')),
                    separated_list0(ws(char(',')), parse_string_literal),
                    preceded(multispace0, char(')')),
                ),
            ),
            preceded(multispace0, char(';')),
        ),
        |(name, args)| (name.rsplit('.').next().unwrap_or(name), args),
    )(input)
}

/// A block whose only statements are evidence calls.
pub fn parse_hole_block(input: &str) -> IResult<&str, Vec<(&str, Vec<&str>)>> {
    delimited(
        ws(char('{')),
        many1(terminated(parse_evidence_call, multispace0)),
        char('}'),
    )(input)
}

fn parse_parameter(input: &str) -> IResult<&str, (TypeExpr, &str)> {
    preceded(
        many0(terminated(
            alt((tag("final"), recognize(pair(char('@'), parse_qualified_name)))),
            multispace1,
        )),
        tuple((terminated(parse_type_expr, multispace1), parse_identifier)),
    )(input)
}

/// A formal parameter list including its parentheses.
pub fn parse_parameter_list(input: &str) -> IResult<&str, Vec<(TypeExpr, &str)>> {
    delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), parse_parameter),
        preceded(multispace0, char(')')),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_constructor_signature() {
        let sig = signature("java.io.FileReader(java.lang.String)").unwrap();
        assert_eq!(sig.qualified_name(), "java.io.FileReader");
        assert_eq!(sig.owner_name().as_deref(), Some("java.io"));
        assert_eq!(sig.params, vec![TypeExpr::class("java.lang.String")]);
    }

    #[test]
    fn test_parse_generic_method_signature() {
        let sig = signature("java.util.List<Tau_E>.add(Tau_E)").unwrap();
        assert_eq!(sig.owner_name().as_deref(), Some("java.util.List"));
        assert_eq!(sig.member_name(), "add");
        assert_eq!(
            sig.method_class_args(),
            &[TypeExpr::Placeholder("E".to_string())]
        );
        assert_eq!(sig.params, vec![TypeExpr::Placeholder("E".to_string())]);
    }

    #[test]
    fn test_parse_nested_type_expr() {
        let t = type_expr("java.util.Map<K, java.util.List<? extends V>>[]").unwrap();
        assert_eq!(t.to_string(), "java.util.Map<K,java.util.List<? extends V>>[]");
        assert_eq!(type_expr("int").unwrap(), TypeExpr::Primitive(Primitive::Int));
        assert!(type_expr("java.util.List<").is_err());
    }

    #[test]
    fn test_super_wildcard_keeps_bound() {
        let t = type_expr("java.util.Comparator<? super T>").unwrap();
        assert_eq!(t.to_string(), "java.util.Comparator<? super T>");
        let bound = t.bind_vars(&["T"]);
        assert!(bound.is_open());
        match bound {
            TypeExpr::Class { args, .. } => assert_eq!(
                args[0],
                TypeExpr::SuperWildcard(Box::new(TypeExpr::Var("T".to_string())))
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bad_signature_is_malformed() {
        let err = signature("java.io.FileReader(").unwrap_err();
        assert!(matches!(err, SynthesisError::MalformedSketch { .. }));
    }

    #[test]
    fn test_parse_hole_block() {
        let src = "{\n    Evidence.apicalls(\"readLine\");\n    Evidence.types(\"FileReader\", \"a\\\"b\");\n}";
        let (rest, calls) = parse_hole_block(src).unwrap();
        assert_eq!(rest, "");
        assert_eq!(calls[0], ("apicalls", vec!["readLine"]));
        assert_eq!(calls[1].1[1], "a\\\"b");
        assert!(parse_hole_block("{ Evidence.apicalls(\"x\"); foo(); }").is_err());
    }

    #[test]
    fn test_parse_parameter_list() {
        let (_, params) =
            parse_parameter_list("(final String file, java.util.List<String> xs, int[] n)").unwrap();
        assert_eq!(params.len(), 3);
        assert_eq!(params[0].1, "file");
        assert_eq!(params[1].0.to_string(), "java.util.List<String>");
        assert_eq!(params[2].0, TypeExpr::Array(Box::new(TypeExpr::Primitive(Primitive::Int))));
    }
}
