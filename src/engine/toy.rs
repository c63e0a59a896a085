//! A minimal line-oriented scene engine.
//!
//! `ToyEngine` exists so the pool can be driven end to end without an
//! embedded VM. One statement per line:
//!
//! ```text
//! # comment
//! size = 64                  bind an integer (or 'quoted' / "quoted" string)
//! size                       echo a bound value
//! print rendering...         write a line to the output sink
//! raise something broke      fail the evaluation
//! scene size 32 gradient     declare a scene: width height pattern
//! scene 8 8 checker 2 #ff0000 #0000ff
//! scene 8 8 solid #336699
//! ```
//!
//! Bindings persist across evaluations. The text result is the last value
//! produced (empty if none); a declared scene renders as `<scene WxH>`.

use super::{EngineError, Evaluation, OutputSink, Scene, SceneEngine};
use crate::color::Rgb;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Sky color at the top of a gradient scene.
const SKY: Rgb = Rgb::new(128, 178, 255);

/// A bound value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Int(i64),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "'{s}'"),
        }
    }
}

/// Pixel pattern of a [`ToyScene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    /// White at row 0 fading to sky blue at the top row.
    Gradient,
    /// Alternating squares of `cell` pixels.
    Checker { cell: u32, a: Rgb, b: Rgb },
    /// One flat color.
    Solid(Rgb),
}

/// Scene produced by [`ToyEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToyScene {
    width: u32,
    height: u32,
    pattern: Pattern,
}

impl ToyScene {
    fn pixel(&self, x: u32, row: u32) -> Rgb {
        match self.pattern {
            Pattern::Gradient => {
                #[allow(clippy::cast_precision_loss)]
                let t = if self.height > 1 {
                    row as f32 / (self.height - 1) as f32
                } else {
                    0.0
                };
                Rgb::WHITE.lerp(SKY, t)
            }
            Pattern::Checker { cell, a, b } => {
                if ((x / cell) + (row / cell)) % 2 == 0 {
                    a
                } else {
                    b
                }
            }
            Pattern::Solid(color) => color,
        }
    }
}

impl Scene for ToyScene {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn row_colors(&mut self, row: u32) -> Vec<u32> {
        (0..self.width).map(|x| self.pixel(x, row).pack()).collect()
    }
}

/// Reference [`SceneEngine`] understanding the statements listed in the
/// module docs.
#[derive(Debug)]
pub struct ToyEngine {
    bindings: BTreeMap<String, Value>,
    output: OutputSink,
}

impl ToyEngine {
    /// Create an engine writing `print` output to `output`.
    pub fn new(output: OutputSink) -> Self {
        Self {
            bindings: BTreeMap::new(),
            output,
        }
    }

    fn is_identifier(token: &str) -> bool {
        let mut chars = token.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    fn lookup(&self, name: &str) -> Result<&Value, EngineError> {
        self.bindings
            .get(name)
            .ok_or_else(|| EngineError::new(format!("name '{name}' is not defined")))
    }

    /// Parse a literal or resolve a bound name.
    fn value_of(&self, token: &str) -> Result<Value, EngineError> {
        let token = token.trim();
        if let Ok(n) = token.parse::<i64>() {
            return Ok(Value::Int(n));
        }
        for quote in ['\'', '"'] {
            if let Some(inner) = token
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
            {
                return Ok(Value::Str(inner.to_string()));
            }
        }
        if Self::is_identifier(token) {
            return self.lookup(token).cloned();
        }
        Err(EngineError::new(format!("invalid value `{token}`")))
    }

    fn positive(&self, token: Option<&str>, what: &str) -> Result<u32, EngineError> {
        let token = token.ok_or_else(|| EngineError::new(format!("missing {what}")))?;
        match self.value_of(token)? {
            Value::Int(n) if n > 0 => u32::try_from(n)
                .map_err(|_| EngineError::new(format!("{what} {n} is too large"))),
            other => Err(EngineError::new(format!(
                "{what} must be a positive integer, got {other}"
            ))),
        }
    }

    fn color(&self, token: Option<&str>) -> Result<Rgb, EngineError> {
        let token = token.ok_or_else(|| EngineError::new("missing color"))?;
        Rgb::parse_hex(token).ok_or_else(|| EngineError::new(format!("invalid color `{token}`")))
    }

    fn scene(&self, args: &str) -> Result<ToyScene, EngineError> {
        let mut tokens = args.split_whitespace();
        let width = self.positive(tokens.next(), "width")?;
        let height = self.positive(tokens.next(), "height")?;
        let pattern = match tokens.next() {
            None | Some("gradient") => Pattern::Gradient,
            Some("checker") => Pattern::Checker {
                cell: self.positive(tokens.next(), "checker size")?,
                a: self.color(tokens.next())?,
                b: self.color(tokens.next())?,
            },
            Some("solid") => Pattern::Solid(self.color(tokens.next())?),
            Some(other) => return Err(EngineError::new(format!("unknown pattern `{other}`"))),
        };
        if let Some(extra) = tokens.next() {
            return Err(EngineError::new(format!("unexpected `{extra}` after pattern")));
        }
        Ok(ToyScene {
            width,
            height,
            pattern,
        })
    }

    fn statement(
        &mut self,
        line: &str,
        text: &mut String,
        scene: &mut Option<ToyScene>,
    ) -> Result<(), EngineError> {
        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(k, r)| (k, r.trim()));

        match keyword {
            "print" => {
                let shown = if Self::is_identifier(rest) {
                    self.bindings
                        .get(rest)
                        .map_or_else(|| rest.to_string(), ToString::to_string)
                } else {
                    rest.to_string()
                };
                self.output.write_str(&shown);
                self.output.write_str("\n");
            }
            "raise" => {
                let message = if rest.is_empty() { "exception raised" } else { rest };
                return Err(EngineError::new(message));
            }
            "scene" => {
                let built = self.scene(rest)?;
                *text = format!("<scene {}x{}>", built.width, built.height);
                *scene = Some(built);
            }
            _ => {
                if let Some((name, value)) = line.split_once('=') {
                    let name = name.trim();
                    if !Self::is_identifier(name) {
                        return Err(EngineError::new(format!("cannot assign to `{name}`")));
                    }
                    let value = self.value_of(value)?;
                    *text = value.to_string();
                    self.bindings.insert(name.to_string(), value);
                } else if Self::is_identifier(line) {
                    *text = self.lookup(line)?.to_string();
                } else {
                    return Err(EngineError::new(format!("cannot parse `{line}`")));
                }
            }
        }
        Ok(())
    }
}

impl SceneEngine for ToyEngine {
    fn evaluate(&mut self, source: &str) -> Result<Evaluation, EngineError> {
        let mut text = String::new();
        let mut scene = None;

        for (index, raw) in source.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.statement(line, &mut text, &mut scene)
                .map_err(|e| EngineError::new(format!("line {}: {}", index + 1, e.message())))?;
        }

        let evaluation = Evaluation::text(text);
        Ok(match scene {
            Some(scene) => evaluation.with_scene(Box::new(scene)),
            None => evaluation,
        })
    }

    fn local_names(&self) -> Result<BTreeSet<String>, EngineError> {
        Ok(self.bindings.keys().cloned().collect())
    }
}
