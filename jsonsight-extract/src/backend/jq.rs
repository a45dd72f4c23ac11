//! jq filter backend.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use jaq_interpret::{Ctx, Filter, FilterT, ParseCtx, RcIter, Val};
use jaq_syn::filter::{BinaryOp, Filter as Term};
use jaq_syn::path::Part;
use jaq_syn::{Def, Spanned, string};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::trace;

use crate::error::{ExtractError, Result};
use crate::extractor::{Extractor, PATH_SIGIL};

/// The jq standard library, parsed once per process.
static STD_DEFS: LazyLock<Vec<Def>> = LazyLock::new(jaq_std::std);

/// Evaluates jq programs with `jaq`.
///
/// The path sigil is stripped before compiling, so `$.foo.bar` runs the
/// program `.foo.bar`. Each distinct program is compiled once and kept for
/// the lifetime of the extractor.
///
/// jq maps a missing key to `null`. Programs that are plain paths
/// (`.a.b`, `.[0]`, `.items[].name`, or pipes of those) are therefore
/// walked directly, so a key or index that does not exist selects nothing
/// while an explicit `null` is still selected.
#[derive(Default)]
pub struct JqExtractor {
    programs: RwLock<HashMap<String, Arc<Program>>>,
}

impl JqExtractor {
    /// Create an extractor with an empty program cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn program(&self, program: &str) -> Result<Arc<Program>> {
        if let Some(compiled) = self.programs.read().get(program) {
            return Ok(compiled.clone());
        }

        let compiled = Arc::new(Program::compile(program)?);
        trace!(program, plain_path = compiled.steps.is_some(), "Compiled jq program");
        Ok(self
            .programs
            .write()
            .entry(program.to_string())
            .or_insert(compiled)
            .clone())
    }
}

impl fmt::Debug for JqExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JqExtractor")
            .field("programs", &self.programs.read().len())
            .finish()
    }
}

impl Extractor for JqExtractor {
    fn name(&self) -> &'static str {
        "jq"
    }

    fn select(&self, document: &Value, path: &str) -> Result<Vec<Value>> {
        let program = program_text(path);
        let compiled = self.program(program)?;

        match compiled.resolve(document) {
            Some(nodes) => Ok(nodes.into_iter().cloned().collect()),
            None => compiled.outputs(document, program),
        }
    }

    fn select_first(&self, document: &Value, path: &str) -> Result<Option<Value>> {
        let program = program_text(path);
        let compiled = self.program(program)?;

        match compiled.resolve(document) {
            Some(nodes) => Ok(nodes.first().map(|node| (*node).clone())),
            None => compiled.first_output(document, program),
        }
    }
}

fn program_text(path: &str) -> &str {
    let program = path.strip_prefix(PATH_SIGIL).unwrap_or(path);
    if program.trim().is_empty() { "." } else { program }
}

/// One addressing step of a plain path program.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Key(String),
    Index(i64),
    Each,
}

struct Program {
    filter: Filter,
    steps: Option<Vec<Step>>,
}

impl Program {
    fn compile(program: &str) -> Result<Self> {
        let (main, errs) = jaq_parse::parse(program, jaq_parse::main());
        if !errs.is_empty() {
            return Err(ExtractError::parse(format!(
                "invalid jq filter '{}' ({} syntax error(s))",
                program,
                errs.len()
            )));
        }
        let main = main.ok_or_else(|| {
            ExtractError::parse(format!("invalid jq filter '{}'", program))
        })?;

        let steps = if main.defs.is_empty() {
            let mut steps = Vec::new();
            path_steps(&main.body, &mut steps).map(|()| steps)
        } else {
            None
        };

        let mut defs = ParseCtx::new(Vec::new());
        defs.insert_natives(jaq_core::core());
        defs.insert_defs(STD_DEFS.iter().cloned());

        let filter = defs.compile(main);
        if !defs.errs.is_empty() {
            return Err(ExtractError::parse(format!(
                "failed to compile jq filter '{}' ({} undefined name(s))",
                program,
                defs.errs.len()
            )));
        }
        Ok(Self { filter, steps })
    }

    fn resolve<'a>(&self, document: &'a Value) -> Option<Vec<&'a Value>> {
        self.steps.as_deref().and_then(|steps| resolve(document, steps))
    }

    fn outputs(&self, document: &Value, program: &str) -> Result<Vec<Value>> {
        let inputs = RcIter::new(core::iter::empty());
        let outputs = self
            .filter
            .run((Ctx::new([], &inputs), Val::from(document.clone())));

        outputs
            .map(|output| output.map(Value::from).map_err(|e| runtime_error(program, e)))
            .collect()
    }

    /// Pull a single output, leaving the rest of the stream unevaluated.
    fn first_output(&self, document: &Value, program: &str) -> Result<Option<Value>> {
        let inputs = RcIter::new(core::iter::empty());
        let mut outputs = self
            .filter
            .run((Ctx::new([], &inputs), Val::from(document.clone())));

        let first = outputs.next();
        first
            .map(|output| output.map(Value::from).map_err(|e| runtime_error(program, e)))
            .transpose()
    }
}

fn runtime_error(program: &str, error: impl fmt::Display) -> ExtractError {
    ExtractError::type_error(format!("jq filter '{}' failed: {}", program, error))
}

/// Flatten a program built only from `.`, `.key`, `.[n]`, `.[]` and `|` into
/// steps. `None` for anything else.
fn path_steps(term: &Spanned<Term>, steps: &mut Vec<Step>) -> Option<()> {
    match &term.0 {
        Term::Id => Some(()),
        Term::Path(base, parts) => {
            path_steps(base, steps)?;
            for (part, _) in parts {
                steps.push(match part {
                    Part::Index(index) => index_step(index)?,
                    Part::Range(None, None) => Step::Each,
                    Part::Range(..) => return None,
                });
            }
            Some(())
        }
        Term::Binary(lhs, BinaryOp::Pipe(None), rhs) => {
            path_steps(lhs, steps)?;
            path_steps(rhs, steps)
        }
        _ => None,
    }
}

fn index_step(index: &Spanned<Term>) -> Option<Step> {
    match &index.0 {
        Term::Str(text) if text.fmt.is_none() => {
            let mut key = String::new();
            for part in &text.parts {
                match part {
                    string::Part::Str(s) => key.push_str(s),
                    string::Part::Fun(_) => return None,
                }
            }
            Some(Step::Key(key))
        }
        Term::Num(n) => n.parse().ok().map(Step::Index),
        Term::Neg(inner) => match &inner.0 {
            Term::Num(n) => n.parse::<i64>().ok().map(|n| Step::Index(-n)),
            _ => None,
        },
        _ => None,
    }
}

/// Walk `steps` through `document`, dropping branches whose key or index is
/// absent. `None` when a step meets a value it cannot address; jq then runs
/// the program and reports the error itself.
fn resolve<'a>(document: &'a Value, steps: &[Step]) -> Option<Vec<&'a Value>> {
    let mut nodes = vec![document];

    for step in steps {
        let mut next = Vec::with_capacity(nodes.len());
        for node in nodes {
            match (step, node) {
                (Step::Key(_) | Step::Index(_), Value::Null) => {}
                (Step::Key(key), Value::Object(map)) => next.extend(map.get(key)),
                (Step::Index(index), Value::Array(items)) => {
                    let position = if *index < 0 {
                        items.len() as i64 + index
                    } else {
                        *index
                    };
                    if let Ok(position) = usize::try_from(position) {
                        next.extend(items.get(position));
                    }
                }
                (Step::Each, Value::Array(items)) => next.extend(items),
                (Step::Each, Value::Object(map)) => next.extend(map.values()),
                _ => return None,
            }
        }
        nodes = next;
    }

    Some(nodes)
}
