pub mod encoding;
pub mod errors;

pub use encoding::TextEncoding;
pub use errors::{
    CodecResult, DssatError, DssatErrorCategory, DssatResult, ErrorContext, ErrorContextExt,
    ExitPlaceholder, ParserResult,
};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Width of the genotype code (`INGENO` / `VAR#`) key in every DSSAT file.
pub const GENOTYPE_CODE_WIDTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CropType {
    Maize,
    Rice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropProfile {
    pub crop: CropType,
    pub name: &'static str,
    pub display_name: &'static str,
    pub experiment_suffix: &'static str,
    pub abbreviation: &'static str,
    pub genotype_file: &'static str,
    pub simulation_model: &'static str,
    pub genotype_encoding: TextEncoding,
    pub seed_parameters: &'static str,
}

const MAIZE_PROFILE: CropProfile = CropProfile {
    crop: CropType::Maize,
    name: "maize",
    display_name: "Maize",
    experiment_suffix: ".MZX",
    abbreviation: "MZ",
    genotype_file: "MZCER047.CUL",
    simulation_model: "MZCER",
    genotype_encoding: TextEncoding::Utf8,
    seed_parameters: ". IB0001 120.0 0.000 685.0 907.9 10.00 38.90",
};

const RICE_PROFILE: CropProfile = CropProfile {
    crop: CropType::Rice,
    name: "rice",
    display_name: "Rice",
    experiment_suffix: ".RIX",
    abbreviation: "RI",
    genotype_file: "RICER047.CUL",
    simulation_model: "RICER",
    genotype_encoding: TextEncoding::Gbk,
    seed_parameters: ". IB0001 880.0  52.0 550.0  12.1  65.0 .0280  1.00  1.00  83.0   1.0",
};

impl CropType {
    pub const ALL: [CropType; 2] = [CropType::Maize, CropType::Rice];

    pub const fn profile(self) -> &'static CropProfile {
        match self {
            Self::Maize => &MAIZE_PROFILE,
            Self::Rice => &RICE_PROFILE,
        }
    }

    pub const fn as_str(self) -> &'static str {
        self.profile().name
    }

    pub fn from_experiment_suffix(suffix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|crop| crop.profile().experiment_suffix.eq_ignore_ascii_case(suffix))
    }

    /// Suffix of the per-cultivar GLUE batch file, `.MZX` -> `.MZC`.
    pub fn calibration_batch_suffix(self) -> String {
        let suffix = self.profile().experiment_suffix;
        format!("{}C", &suffix[..suffix.len() - 1])
    }
}

impl Display for CropType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

impl FromStr for CropType {
    type Err = DssatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        Self::ALL
            .into_iter()
            .find(|crop| crop.as_str().eq_ignore_ascii_case(normalized))
            .ok_or_else(|| {
                DssatError::input_validation(
                    "INPUT.UNSUPPORTED_CROP",
                    format!(
                        "unsupported crop type '{}'; expected one of: maize, rice",
                        normalized
                    ),
                )
            })
    }
}

/// Run-mode flag passed to the simulation executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub enum RunMode {
    #[default]
    Batch,
    Seasonal,
    Sequence,
    Spatial,
}

impl RunMode {
    pub const fn flag(self) -> char {
        match self {
            Self::Batch => 'B',
            Self::Seasonal => 'N',
            Self::Sequence => 'Q',
            Self::Spatial => 'S',
        }
    }
}

impl Display for RunMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.flag())
    }
}

impl FromStr for RunMode {
    type Err = DssatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "b" | "batch" => Ok(Self::Batch),
            "n" | "seasonal" => Ok(Self::Seasonal),
            "q" | "sequence" => Ok(Self::Sequence),
            "s" | "spatial" => Ok(Self::Spatial),
            other => Err(DssatError::input_validation(
                "INPUT.RUN_MODE",
                format!("unknown run mode '{}'; expected B, N, Q or S", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cultivar {
    pub index: u32,
    pub genotype_code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Treatment {
    pub number: u32,
    pub cultivar_index: u32,
    pub fertilizer_index: u32,
    pub name: String,
}

/// One `*FERTILIZERS` application; tokens are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FertilizerApplication {
    pub date: String,
    pub material: String,
    pub method: String,
    pub depth: String,
    pub nitrogen: String,
    pub phosphorus: String,
    pub potassium: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FertilizerSchedule {
    pub key: String,
    pub index: u32,
    pub applications: Vec<FertilizerApplication>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldContext {
    pub planting_date: String,
    pub ending_date: String,
    pub weather_station: String,
    pub soil_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentDocument {
    pub identifier: String,
    pub crop: CropType,
    pub station: String,
    pub year: i32,
    pub cultivars: Vec<Cultivar>,
    pub treatments: Vec<Treatment>,
    pub fertilizer_schedules: Vec<FertilizerSchedule>,
    pub field: FieldContext,
}

impl ExperimentDocument {
    pub fn file_name(&self) -> String {
        format!("{}{}", self.identifier, self.crop.profile().experiment_suffix)
    }

    pub fn cultivar(&self, index: u32) -> Option<&Cultivar> {
        self.cultivars.iter().find(|cultivar| cultivar.index == index)
    }

    /// Builds the calibration unit for one cultivar.
    pub fn treatment_group(&self, cultivar: &Cultivar) -> TreatmentGroup {
        TreatmentGroup {
            genotype_code: cultivar.genotype_code.clone(),
            cultivar_name: cultivar.name.clone(),
            cultivar_index: cultivar.index,
            treatment_numbers: self
                .treatments
                .iter()
                .filter(|treatment| treatment.cultivar_index == cultivar.index)
                .map(|treatment| treatment.number)
                .collect(),
        }
    }

    pub fn treatment_groups(&self) -> Vec<TreatmentGroup> {
        self.cultivars
            .iter()
            .map(|cultivar| self.treatment_group(cultivar))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreatmentGroup {
    pub genotype_code: String,
    pub cultivar_name: String,
    pub cultivar_index: u32,
    pub treatment_numbers: Vec<u32>,
}
