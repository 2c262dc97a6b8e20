use crate::codec::{CultivarLine, FertilizerLine, FieldLine, TreatmentLine};
use crate::domain::{CodecResult, DssatError, DssatResult, ErrorContextExt, ExperimentDocument};
use crate::serialization::write_text_artifact;
use chrono::{Datelike, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::info;

const EXPERIMENT_TEMPLATE: &str = include_str!("experiment.template");
const FIELD_ID_SUFFIX: &str = "0001";

/// Renders the complete experiment file for `document`.
pub fn render_experiment(document: &ExperimentDocument) -> CodecResult<String> {
    let profile = document.crop.profile();

    let treatments = document
        .treatments
        .iter()
        .map(|treatment| {
            TreatmentLine {
                number: treatment.number,
                cultivar_index: treatment.cultivar_index,
                fertilizer_index: fertilizer_level(treatment.fertilizer_index),
                name: treatment.name.clone(),
            }
            .encode()
        })
        .collect::<CodecResult<Vec<_>>>()?;

    let cultivars = document
        .cultivars
        .iter()
        .map(|cultivar| {
            CultivarLine {
                index: cultivar.index,
                crop_abbreviation: profile.abbreviation.to_string(),
                genotype_code: cultivar.genotype_code.clone(),
                name: cultivar.name.clone(),
            }
            .encode()
        })
        .collect::<CodecResult<Vec<_>>>()?;

    let mut fertilizers = Vec::new();
    for schedule in &document.fertilizer_schedules {
        for application in &schedule.applications {
            fertilizers.push(
                FertilizerLine {
                    level: fertilizer_level(schedule.index),
                    application: application.clone(),
                }
                .encode()?,
            );
        }
    }

    let field_line = FieldLine {
        level: 1,
        field_id: format!("{}{}", document.station, FIELD_ID_SUFFIX),
        weather_station: document.field.weather_station.clone(),
        soil_id: document.field.soil_id.clone(),
    }
    .encode()?;

    let year = document.year.to_string();
    let pdate_minus_1 = day_before(&document.field.planting_date, document.year)?;
    let treatments = treatments.join("\n");
    let cultivars = cultivars.join("\n");
    let fertilizers = fertilizers.join("\n");
    let values = [
        ("file_name", document.identifier.as_str()),
        ("abbreviation", profile.abbreviation),
        ("station", document.station.as_str()),
        ("year", year.as_str()),
        ("treatments", treatments.as_str()),
        ("cultivars", cultivars.as_str()),
        ("field_line", field_line.as_str()),
        ("fertilizers", fertilizers.as_str()),
        ("pdate", document.field.planting_date.as_str()),
        ("pdate_minus_1", pdate_minus_1.as_str()),
        ("edate", document.field.ending_date.as_str()),
        ("harvest_name", profile.display_name),
        ("simulation_model", profile.simulation_model),
    ];
    fill_template(EXPERIMENT_TEMPLATE, &values)
}

/// Writes `<dir>/<identifier><suffix>` and returns its path.
pub fn write_experiment(document: &ExperimentDocument, dir: &Path) -> DssatResult<PathBuf> {
    let content = render_experiment(document).map_err(|error| {
        error
            .with_experiment(&document.identifier)
            .with_path(dir.join(document.file_name()))
    })?;
    let path = dir.join(document.file_name());
    write_text_artifact(&path, &content).in_experiment(&document.identifier)?;
    info!(
        experiment = %document.identifier,
        path = %path.display(),
        treatments = document.treatments.len(),
        "wrote experiment file"
    );
    Ok(path)
}

/// Schedules are indexed from zero; the simulator reserves level 0 for
/// "no fertilizer", so the written level is one higher.
fn fertilizer_level(schedule_index: u32) -> u32 {
    schedule_index + 1
}

/// `YYDDD` of the day before `date`, rolling back into the previous year.
fn day_before(date: &str, document_year: i32) -> CodecResult<String> {
    let invalid = || {
        DssatError::codec(
            "CODEC.JULIAN_DATE",
            format!("planting date '{}' is not a YYDDD date", date),
        )
    };
    if date.len() != 5 || !date.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let two_digit: i32 = date[..2].parse().map_err(|_| invalid())?;
    let ordinal: u32 = date[2..].parse().map_err(|_| invalid())?;
    let full_year = document_year - document_year.rem_euclid(100) + two_digit;
    let previous = NaiveDate::from_yo_opt(full_year, ordinal)
        .and_then(|day| day.pred_opt())
        .ok_or_else(invalid)?;
    Ok(format!(
        "{:02}{:03}",
        previous.year().rem_euclid(100),
        previous.ordinal()
    ))
}

/// Substitutes `{name}` placeholders in one pass so substituted values are
/// never re-scanned.
fn fill_template(template: &str, values: &[(&str, &str)]) -> CodecResult<String> {
    let mut output = String::with_capacity(template.len() * 2);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            DssatError::codec(
                "CODEC.TEMPLATE_PLACEHOLDER",
                "experiment template has an unterminated placeholder",
            )
        })?;
        let name = &after[..close];
        let value = values
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| {
                DssatError::codec(
                    "CODEC.TEMPLATE_PLACEHOLDER",
                    format!("experiment template placeholder '{{{}}}' has no value", name),
                )
            })?;
        output.push_str(value);
        rest = &after[close + 1..];
    }
    output.push_str(rest);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::{day_before, fill_template, render_experiment};
    use crate::experiment::builder::{TreatmentRow, build_with_reference_year};

    fn document() -> crate::domain::ExperimentDocument {
        let rows = [TreatmentRow {
            genotype_code: "IB0063".to_string(),
            cultivar_name: "PIO X304C".to_string(),
            weather: "WST1".to_string(),
            soil: "SL01".to_string(),
            planting_date: "18150".to_string(),
            ending_date: "18200".to_string(),
            fertilizers: "18150 FE001 AP001 5 30 0 0".to_string(),
        }];
        build_with_reference_year("maize", "IBWA8301", &rows, 2024).expect("document builds")
    }

    #[test]
    fn rendered_file_carries_the_section_headers_in_order() {
        let text = render_experiment(&document()).expect("renders");
        let sections: Vec<&str> = text
            .lines()
            .filter(|line| line.starts_with('*'))
            .map(|line| line.split(':').next().unwrap_or(line))
            .map(|header| header.split("  ").next().unwrap_or(header).trim())
            .collect();
        assert_eq!(
            sections,
            vec![
                "*EXP.DETAILS",
                "*GENERAL",
                "*TREATMENTS",
                "*CULTIVARS",
                "*FIELDS",
                "*SOIL ANALYSIS",
                "*INITIAL CONDITIONS",
                "*PLANTING DETAILS",
                "*IRRIGATION AND WATER MANAGEMENT",
                "*FERTILIZERS (INORGANIC)",
                "*RESIDUES AND ORGANIC FERTILIZER",
                "*CHEMICAL APPLICATIONS",
                "*TILLAGE AND ROTATIONS",
                "*ENVIRONMENT MODIFICATIONS",
                "*HARVEST DETAILS",
                "*SIMULATION CONTROLS",
            ]
        );
        assert!(text.starts_with("*EXP.DETAILS: IBWA8301MZ IBWA1983\n"));
        assert!(!text.contains('{'));
    }

    #[test]
    fn rendered_records_sit_in_their_columns() {
        let text = render_experiment(&document()).expect("renders");
        let lines: Vec<&str> = text.lines().collect();
        let after = |header: &str| {
            let position = lines
                .iter()
                .position(|line| line.starts_with(header))
                .expect("header present");
            lines[position + 1]
        };

        let treatment = after("@N R O C TNAME");
        assert_eq!(&treatment[9..18], "PIO X304C");
        assert_eq!(&treatment[35..37], " 1");
        assert_eq!(&treatment[53..55], " 1");

        let cultivar = after("@C CR INGENO CNAME");
        assert_eq!(cultivar, " 1 MZ IB0063 PIO X304C");

        let fertilizer = after("@F FDATE");
        assert!(fertilizer.starts_with(" 1 18150 FE001 AP001     5    30"));

        let initial = after("@C   PCR ICDAT");
        assert!(initial.starts_with(" 1    MZ 18149   -99"));
        assert!(text.contains("DEFAULT SIMULATION CONTR  MZCER"));
    }

    #[test]
    fn day_before_rolls_back_across_years() {
        assert_eq!(day_before("18150", 2018).expect("date"), "18149");
        assert_eq!(day_before("21001", 2021).expect("date"), "20366");
        assert_eq!(day_before("22001", 2022).expect("date"), "21365");
        assert!(day_before("18367", 2018).is_err());
    }

    #[test]
    fn template_values_are_not_rescanned() {
        let filled = fill_template("{a}-{b}", &[("a", "{b}"), ("b", "x")]).expect("fills");
        assert_eq!(filled, "{b}-x");
        assert!(fill_template("{missing}", &[]).is_err());
    }
}
