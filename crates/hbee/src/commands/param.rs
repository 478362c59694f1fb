//! `hbee param`: the p01-p16 table and the tenths codec.

use serde::Serialize;
use tabled::Tabled;

use hbee_api::param::{self, PARAMS, ParamSpec};

use crate::cli::{GlobalOpts, ParamArgs, ParamCommand};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ParamRow {
    #[tabled(rename = "Param")]
    id: String,
    #[tabled(rename = "Meaning")]
    label: &'static str,
    #[tabled(rename = "Range")]
    range: String,
    #[tabled(rename = "Kind")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ParamEntry {
    id: String,
    label: &'static str,
    min: f64,
    max: f64,
    integral: bool,
    tenths: bool,
}

impl From<&ParamSpec> for ParamEntry {
    fn from(spec: &ParamSpec) -> Self {
        Self {
            id: spec.id().to_string(),
            label: spec.label,
            min: spec.min,
            max: spec.max,
            integral: spec.integral,
            tenths: spec.tenths,
        }
    }
}

fn to_row(entry: &ParamEntry) -> ParamRow {
    let kind = match (entry.integral, entry.tenths) {
        (true, _) => "selector",
        (false, true) => "tenths",
        (false, false) => "number",
    };
    ParamRow {
        id: entry.id.clone(),
        label: entry.label,
        range: format!("{} .. {}", entry.min, entry.max),
        kind,
    }
}

pub fn handle(args: &ParamArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let out = match &args.command {
        ParamCommand::List => {
            let entries: Vec<ParamEntry> = PARAMS.iter().map(ParamEntry::from).collect();
            output::render_list(&global.output, &entries, to_row, |e| e.id.clone())
        }
        ParamCommand::Decode { raw } => param::decode_tenths(raw).map_err(|e| invalid("raw", &e))?,
        ParamCommand::Encode { value } => param::encode_tenths(value)
            .map_err(|e| invalid("value", &e))?
            .to_string(),
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

fn invalid(field: &str, err: &param::ParamError) -> CliError {
    CliError::Validation {
        field: field.into(),
        reason: err.to_string(),
    }
}
