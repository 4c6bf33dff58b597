//! Output rendering
//!
//! - stdout = rendered values only (JSON, text template or table)
//! - stderr = progress, warnings and errors
//!
//! Values are rendered from their serialized form: field order is the
//! declaration order, field names are the serialized names. A JSON array
//! is a sequence value (one row or line per element), a JSON object is a
//! single value (a two-column key/value table, or one line).

use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::ops::{Deref, DerefMut};

use clap::ValueEnum;
use comfy_table::{presets, Cell, ContentArrangement, Table};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;
use crate::state::Context;
use crate::words;

const NOT_AVAILABLE: &str = "n/a";

pub const OUTPUT_HELP: &str = "\
Output formats

Commands rendering a result accept the global --output-format (-O) flag:

  table  human-readable table (default when stdout is a terminal)
  text   one line per item, fields separated by tabs (default otherwise)
  json   one JSON document, as returned by the API

--output-template forces the text format with a custom template. Templates
use {{.Field}} placeholders named after the table labels of the item, e.g.

  nimbus compute instance list --output-template '{{.Name}}|{{.ID}}'

The JSON field names work too ({{ name }}, {{ ip_address }}). Referencing a
field the item does not have is an error; empty values print nothing. Each
command's help lists the fields its output supports.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
    Table,
}

impl OutputFormat {
    /// Table on a terminal, text otherwise.
    pub fn detect(stdout_is_term: bool) -> Self {
        if stdout_is_term {
            OutputFormat::Table
        } else {
            OutputFormat::Text
        }
    }
}

/// A value a command hands to the renderer.
pub trait Output: Serialize {
    /// Header of the key/value table of a single value.
    fn type_name() -> Option<&'static str> {
        None
    }

    /// Label overrides, by serialized field name.
    fn labels() -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Fields left out of tables and default text templates.
    fn hidden() -> &'static [&'static str] {
        &[]
    }

    /// Field names in display order. Needed to print headers for empty
    /// sequences and to list template annotations.
    fn fields() -> Vec<String> {
        Vec::new()
    }

    /// Labels and hidden fields of the elements of a nested sequence field.
    fn nested(_field: &str) -> Option<TableRules> {
        None
    }
}

/// Display rules of a type rendered inside another one's table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableRules {
    pub labels: &'static [(&'static str, &'static str)],
    pub hidden: &'static [&'static str],
}

impl TableRules {
    pub fn of<T: Output>() -> Self {
        Self {
            labels: T::labels(),
            hidden: T::hidden(),
        }
    }

    fn label(&self, key: &str) -> String {
        label_for(self.labels, key)
    }
}

fn label_for(labels: &[(&str, &str)], key: &str) -> String {
    labels
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, l)| l.to_string())
        .unwrap_or_else(|| words::title_case(key))
}

/// Template name of a field: its display label without spaces, so
/// `ip_address` labelled "IP Address" is `.IPAddress`.
pub fn template_name<O: Output>(key: &str) -> String {
    label_for(O::labels(), key)
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

impl Output for () {}

/// Serialized field names of `T`'s default value.
pub fn field_keys<T: Serialize + Default>() -> Vec<String> {
    match serde_json::to_value(T::default()) {
        Ok(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Sequence output value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct List<T>(pub Vec<T>);

impl<T> Default for List<T> {
    fn default() -> Self {
        List(Vec::new())
    }
}

impl<T> Deref for List<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.0
    }
}

impl<T> DerefMut for List<T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        &mut self.0
    }
}

impl<T> FromIterator<T> for List<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        List(iter.into_iter().collect())
    }
}

impl<T: Output + Default> Output for List<T> {
    fn labels() -> &'static [(&'static str, &'static str)] {
        T::labels()
    }

    fn hidden() -> &'static [&'static str] {
        T::hidden()
    }

    fn fields() -> Vec<String> {
        let fields = T::fields();
        if fields.is_empty() {
            field_keys::<T>()
        } else {
            fields
        }
    }

    fn nested(field: &str) -> Option<TableRules> {
        T::nested(field)
    }
}

/// `{{.Field}}` placeholders available to `--output-template`.
pub fn template_annotations<O: Output>() -> Vec<String> {
    let hidden = O::hidden();
    O::fields()
        .into_iter()
        .filter(|f| !hidden.contains(&f.as_str()))
        .map(|f| placeholder::<O>(&f))
        .collect()
}

fn placeholder<O: Output>(key: &str) -> String {
    format!("{{{{.{}}}}}", template_name::<O>(key))
}

// ============ Templates ============

/// Rewrite `.Field` lookups inside `{{ }}` actions to the serialized field
/// names minijinja resolves. Lookups after an expression (`a.b`, `f().b`)
/// and anything inside string literals are left alone.
fn translate_template(template: &str, names: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let action = &rest[start..];
        let end = action.find("}}").map(|i| i + 2).unwrap_or(action.len());
        out.push_str(&translate_action(&action[..end], names));
        rest = &action[end..];
    }
    out.push_str(rest);
    out
}

fn translate_action(action: &str, names: &HashMap<String, String>) -> String {
    let chars: Vec<char> = action.chars().collect();
    let mut out = String::with_capacity(action.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 1;
            } else if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        let after_expr = i > 0 && {
            let prev = chars[i - 1];
            prev.is_alphanumeric() || matches!(prev, '_' | ')' | ']')
        };
        let starts_ident = chars.get(i + 1).is_some_and(|n| n.is_ascii_alphabetic());

        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            '.' if !after_expr && starts_ident => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let ident: String = chars[i + 1..j].iter().collect();
                out.push_str(names.get(&ident).map(String::as_str).unwrap_or(&ident));
                i = j;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Template name to serialized name, for every field of `value`.
fn template_names<O: Output>(value: &Value) -> HashMap<String, String> {
    let mut keys = O::fields();
    let sample = match value {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    if let Some(Value::Object(map)) = sample {
        keys.extend(map.keys().cloned());
    }
    keys.into_iter()
        .map(|key| (template_name::<O>(&key), key))
        .collect()
}

// ============ Rendering ============

/// Render `value` to stdout with the process-wide format and template.
pub fn print_output<O: Output>(ctx: &Context, value: &O) -> Result<(), CliError> {
    let state = ctx.state();
    let mut out = ctx.stdout();
    render_to(
        &mut out,
        state.output_format,
        state.output_template.as_deref(),
        value,
    )?;
    out.flush()?;
    Ok(())
}

/// A template always selects the text path.
pub fn render_to<O: Output>(
    w: &mut dyn Write,
    format: OutputFormat,
    template: Option<&str>,
    value: &O,
) -> Result<(), CliError> {
    if let Some(template) = template {
        return render_text(w, template, value);
    }

    match format {
        OutputFormat::Json => render_json(w, value),
        OutputFormat::Text => render_text(w, &default_template::<O>(value)?, value),
        OutputFormat::Table => render_table(w, value),
    }
}

fn to_value<O: Serialize>(value: &O) -> Result<Value, CliError> {
    serde_json::to_value(value).map_err(|e| CliError::Render(e.to_string()))
}

fn render_json<O: Output>(w: &mut dyn Write, value: &O) -> Result<(), CliError> {
    serde_json::to_writer(&mut *w, value).map_err(|e| CliError::Render(e.to_string()))?;
    writeln!(w)?;
    Ok(())
}

/// Visible columns: declared fields, else keys of the first element.
fn columns<O: Output>(value: &Value) -> Vec<String> {
    let mut fields = O::fields();
    if fields.is_empty() {
        let sample = match value {
            Value::Array(items) => items.first(),
            other => Some(other),
        };
        if let Some(Value::Object(map)) = sample {
            fields = map.keys().cloned().collect();
        }
    }
    let hidden = O::hidden();
    fields.retain(|f| !hidden.contains(&f.as_str()));
    fields
}

fn default_template<O: Output>(value: &O) -> Result<String, CliError> {
    let value = to_value(value)?;
    Ok(columns::<O>(&value)
        .iter()
        .map(|f| placeholder::<O>(f))
        .collect::<Vec<_>>()
        .join("\t"))
}

fn render_text<O: Output>(w: &mut dyn Write, template: &str, value: &O) -> Result<(), CliError> {
    let value = to_value(value)?;
    let source = translate_template(template, &template_names::<O>(&value));

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    // none prints as nothing rather than "none"
    env.set_formatter(|out, state, value| {
        if value.is_none() {
            Ok(())
        } else {
            minijinja::escape_formatter(out, state, value)
        }
    });
    let tmpl = env
        .template_from_str(&source)
        .map_err(|e| CliError::Render(format!("invalid template: {e}")))?;

    let items = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    };

    for item in items {
        let line = tmpl
            .render(&item)
            .map_err(|e| CliError::Render(e.to_string()))?;
        writeln!(w, "{line}")?;
    }
    Ok(())
}

fn render_table<O: Output>(w: &mut dyn Write, value: &O) -> Result<(), CliError> {
    let value = to_value(value)?;
    let label = |key: &str| label_for(O::labels(), key);

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Disabled);

    match &value {
        Value::Null => return Ok(()),
        Value::Array(items) => {
            let columns = columns::<O>(&value);
            table.set_header(columns.iter().map(|c| Cell::new(label(c))));
            for item in items {
                table.add_row(columns.iter().map(|c| {
                    Cell::new(cell_text(field(item, c), O::nested(c).as_ref()))
                }));
            }
        }
        Value::Object(map) => {
            if let Some(name) = O::type_name() {
                table.set_header(vec![Cell::new(name), Cell::new("")]);
            }
            let hidden: BTreeSet<&str> = O::hidden().iter().copied().collect();
            for (key, v) in map.iter().filter(|(k, _)| !hidden.contains(k.as_str())) {
                let text = cell_text(Some(v), O::nested(key).as_ref());
                table.add_row(vec![Cell::new(label(key)), Cell::new(text)]);
            }
        }
        scalar => {
            table.add_row(vec![Cell::new(cell_text(Some(scalar), None))]);
        }
    }

    writeln!(w, "{table}")?;
    Ok(())
}

fn field<'a>(item: &'a Value, key: &str) -> Option<&'a Value> {
    match item {
        Value::Object(map) => map.get(key),
        _ => None,
    }
}

/// Text of one table cell. `nested` applies to sequences of objects.
fn cell_text(value: Option<&Value>, nested: Option<&TableRules>) -> String {
    let Some(value) = value else {
        return NOT_AVAILABLE.into();
    };
    match value {
        Value::Null => NOT_AVAILABLE.into(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) if items.is_empty() => NOT_AVAILABLE.into(),
        Value::Array(items) if items.iter().all(Value::is_object) => {
            embedded_table(items, nested.copied().unwrap_or_default())
        }
        Value::Array(items) => items
            .iter()
            .map(|v| cell_text(Some(v), None))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) if map.is_empty() => NOT_AVAILABLE.into(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}:{}", cell_text(Some(v), None)))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Borderless table nested inside a cell.
fn embedded_table(items: &[Value], rules: TableRules) -> String {
    let mut keys: Vec<&String> = Vec::new();
    for item in items {
        if let Value::Object(map) = item {
            for key in map.keys() {
                if !keys.contains(&key) && !rules.hidden.contains(&key.as_str()) {
                    keys.push(key);
                }
            }
        }
    }

    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Disabled);
    table.set_header(keys.iter().map(|k| Cell::new(rules.label(k))));
    for item in items {
        table.add_row(keys.iter().map(|k| Cell::new(cell_text(field(item, k), None))));
    }
    table.to_string()
}
