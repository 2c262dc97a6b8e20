//! Generic encode/decode over declarative fixed-width layouts.

pub mod layout;
pub mod records;

pub use records::{
    BatchEntryLine, CultivarLine, FertilizerLine, FieldLine, GenotypeRecord, TreatmentLine,
};

use crate::domain::{CodecResult, DssatError};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Placeholder the simulator reads as "not applicable / unknown".
pub const SENTINEL: &str = "-99";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
    ZeroPadded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub start: usize,
    pub width: usize,
    pub align: Align,
    /// Decoding consumes the rest of the line instead of `width` columns.
    pub to_line_end: bool,
}

impl FieldSpec {
    pub const fn left(name: &'static str, start: usize, width: usize) -> Self {
        Self::new(name, start, width, Align::Left)
    }

    pub const fn right(name: &'static str, start: usize, width: usize) -> Self {
        Self::new(name, start, width, Align::Right)
    }

    pub const fn zero_padded(name: &'static str, start: usize, width: usize) -> Self {
        Self::new(name, start, width, Align::ZeroPadded)
    }

    const fn new(name: &'static str, start: usize, width: usize, align: Align) -> Self {
        Self {
            name,
            start,
            width,
            align,
            to_line_end: false,
        }
    }

    pub const fn to_line_end(mut self) -> Self {
        self.to_line_end = true;
        self
    }

    pub const fn end(&self) -> usize {
        self.start.saturating_add(self.width)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Treatment,
    Cultivar,
    Field,
    Fertilizer,
    BatchEntry,
    GenotypeRecord,
}

impl RecordKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Treatment => "TREATMENT",
            Self::Cultivar => "CULTIVAR",
            Self::Field => "FIELD",
            Self::Fertilizer => "FERTILIZER",
            Self::BatchEntry => "BATCH",
            Self::GenotypeRecord => "GENOTYPE",
        }
    }

    pub const fn layout(self) -> &'static [FieldSpec] {
        match self {
            Self::Treatment => &layout::TREATMENT_FIELDS,
            Self::Cultivar => &layout::CULTIVAR_FIELDS,
            Self::Field => &layout::FIELD_FIELDS,
            Self::Fertilizer => &layout::FERTILIZER_FIELDS,
            Self::BatchEntry => &layout::BATCH_ENTRY_FIELDS,
            Self::GenotypeRecord => &layout::GENOTYPE_RECORD_FIELDS,
        }
    }

    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.layout().iter().find(|field| field.name == name)
    }
}

impl Display for RecordKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Named field values of one record, keyed by layout field name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldValues {
    values: BTreeMap<&'static str, String>,
}

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, value: impl ToString) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &'static str, value: impl ToString) {
        self.values.insert(name, value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Encodes one record. Fields without a value are written as [`SENTINEL`];
/// a value wider than its column is an error, never truncated.
pub fn encode(kind: RecordKind, fields: &FieldValues) -> CodecResult<String> {
    let layout = kind.layout();
    if let Some(unknown) = fields
        .values
        .keys()
        .find(|name| !layout.iter().any(|field| field.name == **name))
    {
        return Err(DssatError::codec(
            "CODEC.UNKNOWN_FIELD",
            format!("{} record has no field named '{}'", kind, unknown),
        ));
    }

    let mut line = String::new();
    let mut column = 0;
    for field in layout {
        let value = fields.get(field.name).unwrap_or(SENTINEL);
        let rendered = render_field(kind, field, value)?;
        while column < field.start {
            line.push(' ');
            column += 1;
        }
        column += rendered.chars().count();
        line.push_str(&rendered);
    }

    let trimmed_len = line.trim_end().len();
    line.truncate(trimmed_len);
    Ok(line)
}

/// Decodes one record by column position only. Values are trimmed; columns
/// past the end of a short line decode as empty strings.
pub fn decode(kind: RecordKind, line: &str) -> FieldValues {
    let chars: Vec<char> = line.trim_end_matches(['\r', '\n']).chars().collect();
    let mut values = FieldValues::new();
    for field in kind.layout() {
        let end = if field.to_line_end {
            chars.len()
        } else {
            field.end().min(chars.len())
        };
        let value: String = if field.start >= end {
            String::new()
        } else {
            chars[field.start..end].iter().collect()
        };
        values.set(field.name, value.trim());
    }
    values
}

fn render_field(kind: RecordKind, field: &FieldSpec, value: &str) -> CodecResult<String> {
    if value.contains(['\n', '\r']) {
        return Err(DssatError::codec(
            "CODEC.FIELD_LINE_BREAK",
            format!("{} field {} contains a line break", kind, field.name),
        ));
    }

    let length = value.chars().count();
    if length > field.width {
        return Err(DssatError::codec(
            "CODEC.FIELD_OVERFLOW",
            format!(
                "{} field {} value '{}' is {} characters wide but the column holds {}",
                kind, field.name, value, length, field.width
            ),
        ));
    }

    let width = if field.to_line_end { length } else { field.width };
    match field.align {
        Align::Left => Ok(format!("{value:<width$}")),
        Align::Right => Ok(format!("{value:>width$}")),
        Align::ZeroPadded => {
            if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
                return Err(DssatError::codec(
                    "CODEC.FIELD_NOT_NUMERIC",
                    format!(
                        "{} field {} expects digits for zero padding, got '{}'",
                        kind, field.name, value
                    ),
                ));
            }
            Ok(format!("{value:0>width$}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Align, FieldSpec, FieldValues, RecordKind, SENTINEL, decode, encode};
    use crate::domain::DssatErrorCategory;

    #[test]
    fn missing_fields_encode_as_right_aligned_sentinel() {
        let fields = FieldValues::new()
            .with("F", 1)
            .with("FDATE", "18150")
            .with("FMCD", "FE001")
            .with("FACD", "AP001")
            .with("FDEP", 5)
            .with("FAMN", 30)
            .with("FAMP", 0)
            .with("FAMK", 0);
        let line = encode(RecordKind::Fertilizer, &fields).expect("fertilizer encodes");
        assert_eq!(
            line,
            " 1 18150 FE001 AP001     5    30     0     0   -99   -99   -99 -99"
        );
        assert_eq!(decode(RecordKind::Fertilizer, &line).get("FAMC"), Some(SENTINEL));
    }

    #[test]
    fn overflow_fails_instead_of_truncating() {
        let fields = FieldValues::new()
            .with("C", 1)
            .with("CR", "MZ")
            .with("INGENO", "IB00631");
        let error = encode(RecordKind::Cultivar, &fields).expect_err("7-char code overflows");
        assert_eq!(error.category(), DssatErrorCategory::CodecError);
        assert_eq!(error.placeholder(), "CODEC.FIELD_OVERFLOW");
        assert!(error.message().contains("INGENO"));
    }

    #[test]
    fn unknown_field_names_are_rejected() {
        let fields = FieldValues::new().with("CULTIVAR", 1);
        let error = encode(RecordKind::Cultivar, &fields).expect_err("unknown field");
        assert_eq!(error.placeholder(), "CODEC.UNKNOWN_FIELD");
    }

    #[test]
    fn zero_padded_fields_require_digits() {
        let spec = FieldSpec::zero_padded("ICDAT", 0, 5);
        assert_eq!(spec.align, Align::ZeroPadded);
        let rendered = super::render_field(RecordKind::Treatment, &spec, "149")
            .expect("digits pad");
        assert_eq!(rendered, "00149");
        assert!(super::render_field(RecordKind::Treatment, &spec, "14A").is_err());
    }

    #[test]
    fn decoding_uses_columns_not_delimiters() {
        let line = " 1 MZ IB0063 PIO X304C (early)+   \r\n";
        let fields = decode(RecordKind::Cultivar, line);
        assert_eq!(fields.get("C"), Some("1"));
        assert_eq!(fields.get("CR"), Some("MZ"));
        assert_eq!(fields.get("INGENO"), Some("IB0063"));
        assert_eq!(fields.get("CNAME"), Some("PIO X304C (early)+"));
    }

    #[test]
    fn short_lines_decode_missing_columns_as_empty() {
        let fields = decode(RecordKind::Treatment, " 3 1");
        assert_eq!(fields.get("N"), Some("3"));
        assert_eq!(fields.get("TNAME"), Some(""));
        assert_eq!(fields.get("SM"), Some(""));
    }

    #[test]
    fn widths_count_characters_not_bytes() {
        let fields = FieldValues::new()
            .with("VAR#", "UA0001")
            .with("VRNAME", "沈稻一号")
            .with("PARAMETERS", ". IB0001 880.0");
        let line = encode(RecordKind::GenotypeRecord, &fields).expect("encodes");
        assert_eq!(line.chars().position(|c| c == '.'), Some(28));
        assert_eq!(decode(RecordKind::GenotypeRecord, &line).get("VRNAME"), Some("沈稻一号"));
    }
}
