//! Recipe parser.
//!
//! A recipe is the package-description document stored in a repository.
//! This engine recognizes two concrete formats for it, generalizing the
//! teacher's single fixed Cargo-index schema (`PackageVersion` in
//! `package_index.rs`) into a normalized `serde_json::Value` tree any
//! recipe format can be parsed into.

use crate::errors::EngineError;

/// Split into "does this parser own this filename" plus "parse text into
/// a normalized document" so a registry of parsers can be probed in the
/// fixed order `version_info.rs` needs.
pub trait RecipeParser: Send + Sync {
    fn supports(&self, filename: &str) -> bool;
    fn parse(&self, text: &str, filename: &str) -> Result<serde_json::Value, EngineError>;
}

/// `package.json` / `module.json`: the recipe is already a JSON document.
pub struct JsonRecipeParser;

impl RecipeParser for JsonRecipeParser {
    fn supports(&self, filename: &str) -> bool {
        filename.ends_with(".json")
    }

    fn parse(&self, text: &str, filename: &str) -> Result<serde_json::Value, EngineError> {
        serde_json::from_str(text).map_err(|e| EngineError::RecipeParse {
            file: filename.to_string(),
            message: e.to_string(),
        })
    }
}

/// `recipe.sdl`: a small subset of an SDL-style document —
/// `key "value";` pairs and `name { ... }` nested blocks, with `[a, b]`
/// array literals. This mirrors the lightweight declarative format the
/// ecosystem this engine is modeled on supports alongside plain JSON.
pub struct SdlRecipeParser;

impl RecipeParser for SdlRecipeParser {
    fn supports(&self, filename: &str) -> bool {
        filename.ends_with(".sdl")
    }

    fn parse(&self, text: &str, filename: &str) -> Result<serde_json::Value, EngineError> {
        let mut tokens = Tokenizer::new(text);
        parse_block(&mut tokens).map_err(|message| EngineError::RecipeParse {
            file: filename.to_string(),
            message,
        })
    }
}

struct Tokenizer<'a> {
    rest: std::str::Chars<'a>,
    peeked: Option<char>,
}

impl<'a> Tokenizer<'a> {
    fn new(text: &'a str) -> Self {
        Tokenizer {
            rest: text.chars(),
            peeked: None,
        }
    }

    fn peek(&mut self) -> Option<char> {
        if self.peeked.is_none() {
            self.peeked = self.rest.next();
        }
        self.peeked
    }

    fn next(&mut self) -> Option<char> {
        self.peek();
        self.peeked.take()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.next();
            } else {
                break;
            }
        }
    }
}

/// Parses a sequence of `key value;` statements until `}` or end of input.
fn parse_block(t: &mut Tokenizer) -> Result<serde_json::Value, String> {
    let mut map = serde_json::Map::new();
    loop {
        t.skip_ws();
        match t.peek() {
            None | Some('}') => break,
            _ => {
                let key = parse_bare_word(t)?;
                t.skip_ws();
                let value = parse_value(t)?;
                map.insert(key, value);
                t.skip_ws();
                if t.peek() == Some(';') {
                    t.next();
                }
            }
        }
    }
    Ok(serde_json::Value::Object(map))
}

fn parse_bare_word(t: &mut Tokenizer) -> Result<String, String> {
    let mut s = String::new();
    while let Some(c) = t.peek() {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            s.push(c);
            t.next();
        } else {
            break;
        }
    }
    if s.is_empty() {
        return Err("expected an identifier".to_string());
    }
    Ok(s)
}

fn parse_value(t: &mut Tokenizer) -> Result<serde_json::Value, String> {
    t.skip_ws();
    match t.peek() {
        Some('"') => parse_string(t).map(serde_json::Value::String),
        Some('[') => parse_array(t),
        Some('{') => {
            t.next();
            let v = parse_block(t)?;
            t.skip_ws();
            if t.next() != Some('}') {
                return Err("expected closing `}`".to_string());
            }
            Ok(v)
        }
        _ => parse_bare_word(t).map(serde_json::Value::String),
    }
}

fn parse_string(t: &mut Tokenizer) -> Result<String, String> {
    if t.next() != Some('"') {
        return Err("expected opening `\"`".to_string());
    }
    let mut s = String::new();
    loop {
        match t.next() {
            Some('"') => return Ok(s),
            Some('\\') => {
                if let Some(escaped) = t.next() {
                    s.push(escaped);
                }
            }
            Some(c) => s.push(c),
            None => return Err("unterminated string literal".to_string()),
        }
    }
}

fn parse_array(t: &mut Tokenizer) -> Result<serde_json::Value, String> {
    t.next(); // consume '['
    let mut items = Vec::new();
    loop {
        t.skip_ws();
        match t.peek() {
            Some(']') => {
                t.next();
                break;
            }
            None => return Err("unterminated array literal".to_string()),
            _ => {
                items.push(parse_value(t)?);
                t.skip_ws();
                if t.peek() == Some(',') {
                    t.next();
                }
            }
        }
    }
    Ok(serde_json::Value::Array(items))
}

/// Find the parser registered for a given recipe filename.
pub fn parser_for<'a>(
    parsers: &'a [Box<dyn RecipeParser>],
    filename: &str,
) -> Option<&'a dyn RecipeParser> {
    parsers
        .iter()
        .find(|p| p.supports(filename))
        .map(|p| p.as_ref())
}

/// The default parser registry: JSON first, then the SDL subset.
pub fn default_parsers() -> Vec<Box<dyn RecipeParser>> {
    vec![Box::new(JsonRecipeParser), Box::new(SdlRecipeParser)]
}
