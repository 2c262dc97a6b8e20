use crate::codec::layout::CULTIVAR_NAME_MAX_WIDTH;
use crate::domain::{
    CropType, Cultivar, DssatError, DssatResult, ErrorContextExt, ExperimentDocument,
    FertilizerApplication, FertilizerSchedule, FieldContext, GENOTYPE_CODE_WIDTH, Treatment,
};
use chrono::Datelike;
use std::collections::HashMap;
use tracing::debug;

/// Tokens of one fertilizer application: date, material, method, depth, N, P, K.
const FERTILIZER_APPLICATION_TOKENS: usize = 7;
const SCHEDULE_SEPARATOR: char = ';';

/// One treatment's worth of tabular input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreatmentRow {
    pub genotype_code: String,
    pub cultivar_name: String,
    pub weather: String,
    pub soil: String,
    pub planting_date: String,
    pub ending_date: String,
    pub fertilizers: String,
}

/// Builds an experiment document, pivoting two-digit years on the current
/// calendar year.
pub fn build(
    crop: &str,
    file_identifier: &str,
    rows: &[TreatmentRow],
) -> DssatResult<ExperimentDocument> {
    build_with_reference_year(crop, file_identifier, rows, chrono::Local::now().year())
}

pub fn build_with_reference_year(
    crop: &str,
    file_identifier: &str,
    rows: &[TreatmentRow],
    reference_year: i32,
) -> DssatResult<ExperimentDocument> {
    let crop: CropType = crop.parse()?;
    let identifier = file_identifier.trim();
    let (station, year) = split_identifier(identifier, reference_year)?;

    if rows.is_empty() {
        return Err(DssatError::input_validation(
            "INPUT.BUILD_EMPTY_ROWS",
            format!("experiment '{}' has no treatment rows", identifier),
        )
        .with_experiment(identifier));
    }

    let mut cultivars: Vec<Cultivar> = Vec::new();
    let mut cultivar_by_code: HashMap<String, u32> = HashMap::new();
    let mut fertilizer_schedules: Vec<FertilizerSchedule> = Vec::new();
    let mut schedule_by_key: HashMap<String, u32> = HashMap::new();
    let mut treatments = Vec::with_capacity(rows.len());
    let mut field: Option<FieldContext> = None;

    for (position, row) in rows.iter().enumerate() {
        let row_number = position + 1;
        let row = validate_row(row, row_number).in_experiment(identifier)?;
        if field.is_none() {
            field = Some(FieldContext {
                planting_date: row.planting_date.clone(),
                ending_date: row.ending_date.clone(),
                weather_station: row.weather.clone(),
                soil_id: row.soil.clone(),
            });
        }

        let cultivar_index = match cultivar_by_code.get(&row.genotype_code) {
            Some(index) => *index,
            None => {
                let index = cultivars.len() as u32 + 1;
                cultivar_by_code.insert(row.genotype_code.clone(), index);
                cultivars.push(Cultivar {
                    index,
                    genotype_code: row.genotype_code.clone(),
                    name: row.cultivar_name.clone(),
                });
                index
            }
        };

        let fertilizer_index = match schedule_by_key.get(&row.fertilizers) {
            Some(index) => *index,
            None => {
                let index = fertilizer_schedules.len() as u32;
                let applications =
                    parse_schedule(&row.fertilizers, row_number).in_experiment(identifier)?;
                schedule_by_key.insert(row.fertilizers.clone(), index);
                fertilizer_schedules.push(FertilizerSchedule {
                    key: row.fertilizers.clone(),
                    index,
                    applications,
                });
                index
            }
        };

        // First-seen name of the genotype, even when this row disagrees.
        let name = cultivars[cultivar_index as usize - 1].name.clone();
        treatments.push(Treatment {
            number: row_number as u32,
            cultivar_index,
            fertilizer_index,
            name,
        });
    }

    let Some(field) = field else {
        return Err(DssatError::internal(
            "SYS.BUILD_FIELD_CONTEXT",
            format!("experiment '{}' produced no field context", identifier),
        ));
    };

    debug!(
        experiment = identifier,
        crop = %crop,
        cultivars = cultivars.len(),
        treatments = treatments.len(),
        schedules = fertilizer_schedules.len(),
        "built experiment document"
    );

    Ok(ExperimentDocument {
        identifier: identifier.to_string(),
        crop,
        station,
        year,
        cultivars,
        treatments,
        fertilizer_schedules,
        field,
    })
}

/// Splits `IBWA8301` into station `IBWA` and the four-digit year of `83`.
fn split_identifier(identifier: &str, reference_year: i32) -> DssatResult<(String, i32)> {
    let station: String = identifier.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    let digits: Vec<u32> = identifier.chars().filter_map(|c| c.to_digit(10)).collect();
    if identifier.is_empty() || station.is_empty() || digits.len() < 2 {
        return Err(DssatError::input_validation(
            "INPUT.BUILD_FILE_IDENTIFIER",
            format!(
                "file identifier '{}' needs a station code followed by a two-digit year",
                identifier
            ),
        )
        .with_experiment(identifier));
    }

    let two_digit = (digits[0] * 10 + digits[1]) as i32;
    let year = if two_digit <= reference_year.rem_euclid(100) {
        2000 + two_digit
    } else {
        1900 + two_digit
    };
    Ok((station, year))
}

fn validate_row(row: &TreatmentRow, row_number: usize) -> DssatResult<TreatmentRow> {
    let row = TreatmentRow {
        genotype_code: row.genotype_code.trim().to_string(),
        cultivar_name: row.cultivar_name.trim().to_string(),
        weather: row.weather.trim().to_string(),
        soil: row.soil.trim().to_string(),
        planting_date: row.planting_date.trim().to_string(),
        ending_date: row.ending_date.trim().to_string(),
        fertilizers: row.fertilizers.trim().to_string(),
    };

    let required = [
        ("ingeno", &row.genotype_code),
        ("cname", &row.cultivar_name),
        ("weather", &row.weather),
        ("soil", &row.soil),
        ("PDATE", &row.planting_date),
        ("EDATE", &row.ending_date),
        ("FERTILIZERS", &row.fertilizers),
    ];
    if let Some((column, _)) = required.iter().find(|(_, value)| value.is_empty()) {
        return Err(DssatError::input_validation(
            "INPUT.BUILD_MISSING_COLUMN",
            format!("row {} is missing required column '{}'", row_number, column),
        ));
    }

    let code_width = row.genotype_code.chars().count();
    if code_width != GENOTYPE_CODE_WIDTH {
        return Err(DssatError::input_validation(
            "INPUT.BUILD_GENOTYPE_CODE",
            format!(
                "row {} genotype code '{}' is {} characters; expected {}",
                row_number, row.genotype_code, code_width, GENOTYPE_CODE_WIDTH
            ),
        )
        .with_cultivar(&row.genotype_code));
    }

    let name_width = row.cultivar_name.chars().count();
    if name_width > CULTIVAR_NAME_MAX_WIDTH {
        return Err(DssatError::input_validation(
            "INPUT.BUILD_CULTIVAR_NAME",
            format!(
                "row {} cultivar name '{}' is {} characters; at most {} fit the genotype file",
                row_number, row.cultivar_name, name_width, CULTIVAR_NAME_MAX_WIDTH
            ),
        )
        .with_cultivar(&row.genotype_code));
    }

    validate_julian_date(&row.planting_date, "PDATE", row_number)?;
    validate_julian_date(&row.ending_date, "EDATE", row_number)?;
    Ok(row)
}

/// Accepts the simulator's `YYDDD` dates.
fn validate_julian_date(value: &str, column: &str, row_number: usize) -> DssatResult<()> {
    let well_formed = value.len() == 5
        && value.chars().all(|c| c.is_ascii_digit())
        && matches!(value[2..].parse::<u32>(), Ok(1..=366));
    if well_formed {
        Ok(())
    } else {
        Err(DssatError::input_validation(
            "INPUT.BUILD_DATE",
            format!(
                "row {} column '{}' value '{}' is not a YYDDD date",
                row_number, column, value
            ),
        ))
    }
}

fn parse_schedule(key: &str, row_number: usize) -> DssatResult<Vec<FertilizerApplication>> {
    let mut applications = Vec::new();
    for segment in key.split(SCHEDULE_SEPARATOR).map(str::trim) {
        if segment.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = segment.split_whitespace().collect();
        if tokens.len() != FERTILIZER_APPLICATION_TOKENS {
            return Err(DssatError::input_validation(
                "INPUT.BUILD_FERTILIZER",
                format!(
                    "row {} fertilizer application '{}' has {} values; expected {}",
                    row_number,
                    segment,
                    tokens.len(),
                    FERTILIZER_APPLICATION_TOKENS
                ),
            ));
        }
        applications.push(FertilizerApplication {
            date: tokens[0].to_string(),
            material: tokens[1].to_string(),
            method: tokens[2].to_string(),
            depth: tokens[3].to_string(),
            nitrogen: tokens[4].to_string(),
            phosphorus: tokens[5].to_string(),
            potassium: tokens[6].to_string(),
        });
    }

    if applications.is_empty() {
        return Err(DssatError::input_validation(
            "INPUT.BUILD_FERTILIZER",
            format!("row {} fertilizer schedule '{}' has no applications", row_number, key),
        ));
    }
    Ok(applications)
}
