use core::fmt;
use std::fmt::Debug;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{RequestError, SynthesisError};

/// A single API call predicted by the model, e.g.
/// `java.io.BufferedReader.readLine()` or `java.io.FileReader(java.lang.String)`.
#[derive(PartialEq, Eq, Hash, Clone)]
pub struct ApiCall {
    pub signature: String,
    pub source_line: i64,
}

impl ApiCall {
    pub fn new(signature: impl Into<String>) -> Self {
        ApiCall {
            signature: signature.into(),
            source_line: 0,
        }
    }
}

impl fmt::Display for ApiCall {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.signature)
    }
}

impl Debug for ApiCall {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// The shape of the program the model wants. Immutable once parsed; one sketch
/// is synthesized many times against fresh environments.
#[derive(PartialEq, Eq, Clone, Deserialize)]
#[serde(try_from = "RawSketch")]
pub enum Sketch {
    ApiCall(ApiCall),
    Branch {
        cond: Vec<ApiCall>,
        then_arm: Vec<Sketch>,
        else_arm: Vec<Sketch>,
    },
    Loop {
        cond: Vec<ApiCall>,
        body: Vec<Sketch>,
    },
    Except {
        try_arm: Vec<Sketch>,
        catch_arm: Vec<Sketch>,
    },
    SubTree {
        items: Vec<Sketch>,
    },
}

impl Sketch {
    pub fn call(signature: &str) -> Sketch {
        Sketch::ApiCall(ApiCall::new(signature))
    }

    pub fn subtree(items: Vec<Sketch>) -> Sketch {
        Sketch::SubTree { items }
    }

    /// Every API call in the tree, depth first, conditions before arms.
    pub fn api_calls(&self) -> Vec<&ApiCall> {
        let mut calls = Vec::new();
        self.collect_calls(&mut calls);
        calls
    }

    fn collect_calls<'a>(&'a self, out: &mut Vec<&'a ApiCall>) {
        match self {
            Sketch::ApiCall(call) => out.push(call),
            Sketch::Branch {
                cond,
                then_arm,
                else_arm,
            } => {
                out.extend(cond.iter());
                then_arm.iter().for_each(|s| s.collect_calls(out));
                else_arm.iter().for_each(|s| s.collect_calls(out));
            }
            Sketch::Loop { cond, body } => {
                out.extend(cond.iter());
                body.iter().for_each(|s| s.collect_calls(out));
            }
            Sketch::Except { try_arm, catch_arm } => {
                try_arm.iter().for_each(|s| s.collect_calls(out));
                catch_arm.iter().for_each(|s| s.collect_calls(out));
            }
            Sketch::SubTree { items } => items.iter().for_each(|s| s.collect_calls(out)),
        }
    }

    /// API calls whose exceptions no enclosing `Except` handles: everything
    /// except the try arms of `Except` nodes. Catch arms are not covered.
    pub fn uncovered_calls(&self) -> Vec<&ApiCall> {
        let mut calls = Vec::new();
        self.collect_uncovered(&mut calls);
        calls
    }

    /// `uncovered_calls` over a sequence of sibling sketches.
    pub fn uncovered_in(items: &[Sketch]) -> Vec<&ApiCall> {
        let mut calls = Vec::new();
        items.iter().for_each(|s| s.collect_uncovered(&mut calls));
        calls
    }

    fn collect_uncovered<'a>(&'a self, out: &mut Vec<&'a ApiCall>) {
        match self {
            Sketch::Except { catch_arm, .. } => {
                catch_arm.iter().for_each(|s| s.collect_uncovered(out))
            }
            Sketch::ApiCall(call) => out.push(call),
            Sketch::Branch {
                cond,
                then_arm,
                else_arm,
            } => {
                out.extend(cond.iter());
                then_arm
                    .iter()
                    .chain(else_arm)
                    .for_each(|s| s.collect_uncovered(out));
            }
            Sketch::Loop { cond, body } => {
                out.extend(cond.iter());
                body.iter().for_each(|s| s.collect_uncovered(out));
            }
            Sketch::SubTree { items } => items.iter().for_each(|s| s.collect_uncovered(out)),
        }
    }

    /// Parses one sketch.
    pub fn from_json(json: &str) -> Result<Sketch, RequestError> {
        Ok(serde_json::from_str(json)?)
    }

    fn write_indented(&self, f: &mut fmt::Formatter, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        let write_arm = |f: &mut fmt::Formatter, label: &str, arm: &[Sketch]| -> fmt::Result {
            writeln!(f, "{}  {}:", pad, label)?;
            for s in arm {
                s.write_indented(f, depth + 2)?;
            }
            Ok(())
        };
        match self {
            Sketch::ApiCall(call) => writeln!(f, "{}{}", pad, call),
            Sketch::Branch {
                cond,
                then_arm,
                else_arm,
            } => {
                writeln!(f, "{}Branch {:?}", pad, cond)?;
                write_arm(f, "then", then_arm)?;
                write_arm(f, "else", else_arm)
            }
            Sketch::Loop { cond, body } => {
                writeln!(f, "{}Loop {:?}", pad, cond)?;
                write_arm(f, "body", body)
            }
            Sketch::Except { try_arm, catch_arm } => {
                writeln!(f, "{}Except", pad)?;
                write_arm(f, "try", try_arm)?;
                write_arm(f, "catch", catch_arm)
            }
            Sketch::SubTree { items } => {
                writeln!(f, "{}SubTree", pad)?;
                for s in items {
                    s.write_indented(f, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Sketch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

impl Debug for Sketch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// One candidate of a batch: the sketch, or why it could not be read.
pub type Candidate = Result<Sketch, SynthesisError>;

/// Parses a batch of sketches. Accepts a single sketch, an array of sketches,
/// or the model's `{"asts": [{"ast": ...}]}` envelope. Each entry is read on
/// its own; a malformed entry becomes an `Err` candidate and the rest of the
/// batch is kept.
pub fn sketches_from_json(json: &str) -> Result<Vec<Candidate>, RequestError> {
    let batch: Value = serde_json::from_str(json)?;
    let entries = match batch {
        Value::Object(mut envelope) if envelope.contains_key("asts") => {
            match envelope.remove("asts") {
                Some(Value::Array(asts)) => asts
                    .into_iter()
                    .map(|mut entry| entry.get_mut("ast").map(Value::take).unwrap_or(Value::Null))
                    .collect(),
                _ => return Err(RequestError::Batch("`asts` must be an array".to_string())),
            }
        }
        Value::Array(sketches) => sketches,
        one => vec![one],
    };
    Ok(entries.into_iter().map(candidate).collect())
}

fn candidate(value: Value) -> Candidate {
    let raw: RawSketch =
        serde_json::from_value(value).map_err(|e| SynthesisError::malformed(e.to_string()))?;
    Sketch::try_from(raw)
}

// wire form, validated into `Sketch`
#[derive(Deserialize)]
#[serde(tag = "node")]
enum RawSketch {
    #[serde(rename = "APICall", alias = "DAPICall")]
    ApiCall {
        #[serde(alias = "_call")]
        signature: String,
        #[serde(default)]
        source_line: i64,
    },
    #[serde(alias = "DBranch")]
    Branch {
        #[serde(default, alias = "_cond")]
        cond: Vec<RawSketch>,
        #[serde(default, rename = "then", alias = "_then")]
        then_arm: Vec<RawSketch>,
        #[serde(default, rename = "else", alias = "_else")]
        else_arm: Vec<RawSketch>,
    },
    #[serde(alias = "DLoop")]
    Loop {
        #[serde(default, alias = "_cond")]
        cond: Vec<RawSketch>,
        #[serde(default, alias = "_body")]
        body: Vec<RawSketch>,
    },
    #[serde(alias = "DExcept")]
    Except {
        #[serde(default, rename = "try", alias = "_try")]
        try_arm: Vec<RawSketch>,
        #[serde(default, rename = "catch", alias = "_catch")]
        catch_arm: Vec<RawSketch>,
    },
    #[serde(alias = "DSubTree")]
    SubTree {
        #[serde(default, alias = "_nodes")]
        items: Vec<RawSketch>,
    },
}

fn convert_all(raw: Vec<RawSketch>) -> Result<Vec<Sketch>, SynthesisError> {
    raw.into_iter().map(Sketch::try_from).collect()
}

fn convert_cond(raw: Vec<RawSketch>) -> Result<Vec<ApiCall>, SynthesisError> {
    raw.into_iter()
        .map(|r| match r {
            RawSketch::ApiCall {
                signature,
                source_line,
            } => Ok(ApiCall {
                signature,
                source_line,
            }),
            _ => Err(SynthesisError::malformed(
                "condition lists may only contain API calls",
            )),
        })
        .collect()
}

impl TryFrom<RawSketch> for Sketch {
    type Error = SynthesisError;

    fn try_from(raw: RawSketch) -> Result<Self, Self::Error> {
        Ok(match raw {
            RawSketch::ApiCall {
                signature,
                source_line,
            } => Sketch::ApiCall(ApiCall {
                signature,
                source_line,
            }),
            RawSketch::Branch {
                cond,
                then_arm,
                else_arm,
            } => Sketch::Branch {
                cond: convert_cond(cond)?,
                then_arm: convert_all(then_arm)?,
                else_arm: convert_all(else_arm)?,
            },
            RawSketch::Loop { cond, body } => Sketch::Loop {
                cond: convert_cond(cond)?,
                body: convert_all(body)?,
            },
            RawSketch::Except { try_arm, catch_arm } => Sketch::Except {
                try_arm: convert_all(try_arm)?,
                catch_arm: convert_all(catch_arm)?,
            },
            RawSketch::SubTree { items } => Sketch::SubTree {
                items: convert_all(items)?,
            },
        })
    }
}
