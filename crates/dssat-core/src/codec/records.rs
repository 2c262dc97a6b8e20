use super::{FieldValues, RecordKind, decode, encode};
use crate::domain::{
    CodecResult, DssatError, FertilizerApplication, GENOTYPE_CODE_WIDTH, ParserResult,
};
use serde::Serialize;

/// Factor levels the generated experiments share for every treatment.
const FIELD_LEVEL: u32 = 1;
const SOIL_ANALYSIS_LEVEL: u32 = 0;
const INITIAL_CONDITIONS_LEVEL: u32 = 1;
const PLANTING_LEVEL: u32 = 1;
const IRRIGATION_LEVEL: u32 = 1;
const RESIDUE_LEVEL: u32 = 1;
const SIMULATION_CONTROL_LEVEL: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreatmentLine {
    pub number: u32,
    pub cultivar_index: u32,
    pub fertilizer_index: u32,
    pub name: String,
}

impl TreatmentLine {
    pub fn encode(&self) -> CodecResult<String> {
        let fields = FieldValues::new()
            .with("N", self.number)
            .with("R", 1)
            .with("O", 1)
            .with("C", 0)
            .with("TNAME", &self.name)
            .with("CU", self.cultivar_index)
            .with("FL", FIELD_LEVEL)
            .with("SA", SOIL_ANALYSIS_LEVEL)
            .with("IC", INITIAL_CONDITIONS_LEVEL)
            .with("MP", PLANTING_LEVEL)
            .with("MI", IRRIGATION_LEVEL)
            .with("MF", self.fertilizer_index)
            .with("MR", RESIDUE_LEVEL)
            .with("MC", 0)
            .with("MT", 0)
            .with("ME", 0)
            .with("MH", 0)
            .with("SM", SIMULATION_CONTROL_LEVEL);
        encode(RecordKind::Treatment, &fields)
    }

    pub fn decode(line: &str) -> ParserResult<Self> {
        let fields = decode(RecordKind::Treatment, line);
        Ok(Self {
            number: required_number(&fields, RecordKind::Treatment, "N", line)?,
            cultivar_index: required_number(&fields, RecordKind::Treatment, "CU", line)?,
            fertilizer_index: optional_number(&fields, RecordKind::Treatment, "MF", line)?,
            name: fields.get("TNAME").unwrap_or_default().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CultivarLine {
    pub index: u32,
    pub crop_abbreviation: String,
    pub genotype_code: String,
    pub name: String,
}

impl CultivarLine {
    pub fn encode(&self) -> CodecResult<String> {
        let fields = FieldValues::new()
            .with("C", self.index)
            .with("CR", &self.crop_abbreviation)
            .with("INGENO", &self.genotype_code)
            .with("CNAME", &self.name);
        encode(RecordKind::Cultivar, &fields)
    }

    pub fn decode(line: &str) -> ParserResult<Self> {
        let fields = decode(RecordKind::Cultivar, line);
        let genotype_code = fields.get("INGENO").unwrap_or_default().to_string();
        if genotype_code.chars().count() != GENOTYPE_CODE_WIDTH {
            return Err(DssatError::parse(
                "PARSE.CULTIVAR_GENOTYPE_CODE",
                format!(
                    "cultivar line '{}' carries genotype code '{}' instead of a {}-character code",
                    line.trim_end(),
                    genotype_code,
                    GENOTYPE_CODE_WIDTH
                ),
            ));
        }
        Ok(Self {
            index: required_number(&fields, RecordKind::Cultivar, "C", line)?,
            crop_abbreviation: fields.get("CR").unwrap_or_default().to_string(),
            genotype_code,
            name: fields.get("CNAME").unwrap_or_default().to_string(),
        })
    }
}

/// The field-level line carrying the weather station and soil profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLine {
    pub level: u32,
    pub field_id: String,
    pub weather_station: String,
    pub soil_id: String,
}

impl FieldLine {
    pub fn encode(&self) -> CodecResult<String> {
        let fields = FieldValues::new()
            .with("L", self.level)
            .with("ID_FIELD", &self.field_id)
            .with("WSTA", &self.weather_station)
            .with("ID_SOIL", &self.soil_id);
        encode(RecordKind::Field, &fields)
    }

    pub fn decode(line: &str) -> ParserResult<Self> {
        let fields = decode(RecordKind::Field, line);
        let text = |name: &str| fields.get(name).unwrap_or_default().to_string();
        Ok(Self {
            level: required_number(&fields, RecordKind::Field, "L", line)?,
            field_id: text("ID_FIELD"),
            weather_station: text("WSTA"),
            soil_id: text("ID_SOIL"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FertilizerLine {
    pub level: u32,
    pub application: FertilizerApplication,
}

impl FertilizerLine {
    pub fn encode(&self) -> CodecResult<String> {
        let application = &self.application;
        let fields = FieldValues::new()
            .with("F", self.level)
            .with("FDATE", &application.date)
            .with("FMCD", &application.material)
            .with("FACD", &application.method)
            .with("FDEP", &application.depth)
            .with("FAMN", &application.nitrogen)
            .with("FAMP", &application.phosphorus)
            .with("FAMK", &application.potassium);
        encode(RecordKind::Fertilizer, &fields)
    }

    pub fn decode(line: &str) -> ParserResult<Self> {
        let fields = decode(RecordKind::Fertilizer, line);
        let text = |name: &str| fields.get(name).unwrap_or_default().to_string();
        Ok(Self {
            level: required_number(&fields, RecordKind::Fertilizer, "F", line)?,
            application: FertilizerApplication {
                date: text("FDATE"),
                material: text("FMCD"),
                method: text("FACD"),
                depth: text("FDEP"),
                nitrogen: text("FAMN"),
                phosphorus: text("FAMP"),
                potassium: text("FAMK"),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntryLine {
    pub experiment_path: String,
    pub treatment: u32,
    pub replication: u32,
    pub sequence: u32,
    pub option: u32,
    pub crop_component: u32,
}

impl BatchEntryLine {
    pub fn new(experiment_path: impl Into<String>, treatment: u32, replication: u32) -> Self {
        Self {
            experiment_path: experiment_path.into(),
            treatment,
            replication,
            sequence: 0,
            option: 0,
            crop_component: 0,
        }
    }

    pub fn encode(&self) -> CodecResult<String> {
        let fields = FieldValues::new()
            .with("FILEX", &self.experiment_path)
            .with("TRTNO", self.treatment)
            .with("RP", self.replication)
            .with("SQ", self.sequence)
            .with("OP", self.option)
            .with("CO", self.crop_component);
        encode(RecordKind::BatchEntry, &fields)
    }

    pub fn decode(line: &str) -> ParserResult<Self> {
        let fields = decode(RecordKind::BatchEntry, line);
        Ok(Self {
            experiment_path: fields.get("FILEX").unwrap_or_default().to_string(),
            treatment: required_number(&fields, RecordKind::BatchEntry, "TRTNO", line)?,
            replication: optional_number(&fields, RecordKind::BatchEntry, "RP", line)?,
            sequence: optional_number(&fields, RecordKind::BatchEntry, "SQ", line)?,
            option: optional_number(&fields, RecordKind::BatchEntry, "OP", line)?,
            crop_component: optional_number(&fields, RecordKind::BatchEntry, "CO", line)?,
        })
    }
}

/// One line of the master genotype database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenotypeRecord {
    pub genotype_code: String,
    pub cultivar_name: String,
    pub parameters: String,
}

impl GenotypeRecord {
    pub fn encode(&self) -> CodecResult<String> {
        if self.genotype_code.chars().count() != GENOTYPE_CODE_WIDTH {
            return Err(DssatError::codec(
                "CODEC.GENOTYPE_CODE_WIDTH",
                format!(
                    "genotype code '{}' must be exactly {} characters",
                    self.genotype_code, GENOTYPE_CODE_WIDTH
                ),
            ));
        }
        let fields = FieldValues::new()
            .with("VAR#", &self.genotype_code)
            .with("VRNAME", &self.cultivar_name)
            .with("PARAMETERS", &self.parameters);
        encode(RecordKind::GenotypeRecord, &fields)
    }

    /// Returns `None` for header, comment and blank lines.
    pub fn decode(line: &str) -> Option<Self> {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with(['@', '!', '*', '$']) {
            return None;
        }
        let fields = decode(RecordKind::GenotypeRecord, line);
        let genotype_code = fields.get("VAR#").unwrap_or_default();
        if genotype_code.chars().count() != GENOTYPE_CODE_WIDTH {
            return None;
        }
        Some(Self {
            genotype_code: genotype_code.to_string(),
            cultivar_name: fields.get("VRNAME").unwrap_or_default().to_string(),
            parameters: fields.get("PARAMETERS").unwrap_or_default().to_string(),
        })
    }
}

fn required_number(
    fields: &FieldValues,
    kind: RecordKind,
    name: &'static str,
    line: &str,
) -> ParserResult<u32> {
    let raw = fields.get(name).unwrap_or_default();
    raw.parse::<u32>().map_err(|_| {
        DssatError::parse(
            "PARSE.RECORD_FIELD",
            format!(
                "{} field {} expects a non-negative integer, got '{}' in line '{}'",
                kind,
                name,
                raw,
                line.trim_end()
            ),
        )
    })
}

fn optional_number(
    fields: &FieldValues,
    kind: RecordKind,
    name: &'static str,
    line: &str,
) -> ParserResult<u32> {
    match fields.get(name) {
        None | Some("") => Ok(0),
        Some(_) => required_number(fields, kind, name, line),
    }
}
