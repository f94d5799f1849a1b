//! CSV export of the commands issued during a dispatch cycle.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::dispatch::{Command, CommandRecord, CycleReport};

/// Column header of the command log.
const HEADER: &str = "setup,device,kind,phase,connector,unit,limit,protocol,accepted";

/// Exports every command of a cycle to a CSV file at the given path.
///
/// Rows follow the order in which the commands were issued, setup by setup.
///
/// # Arguments
///
/// * `report` - Completed cycle
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(report: &CycleReport, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(report.commands(), buf)
}

/// Writes command records as CSV to any writer.
///
/// Charging commands carry their connector, rate unit and protocol; battery
/// commands leave connector and protocol empty and report the limit in kW.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv<'a>(
    records: impl IntoIterator<Item = &'a CommandRecord>,
    writer: impl Write,
) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(','))?;

    for r in records {
        let (kind, connector, unit, limit, protocol) = match &r.command {
            Command::Charging(p) => (
                "charging",
                p.connector_id.to_string(),
                p.unit.to_string(),
                format!("{:.3}", p.limit),
                p.protocol.as_str().to_string(),
            ),
            Command::Battery { power_kw, .. } => (
                "battery",
                String::new(),
                "kW".to_string(),
                format!("{power_kw:.3}"),
                String::new(),
            ),
        };
        wtr.write_record(&[
            r.setup_id.to_string(),
            r.command.device_id().to_string(),
            kind.to_string(),
            r.phase.to_string(),
            connector,
            unit,
            limit,
            protocol,
            r.accepted.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChargingProfile, RateUnit};
    use crate::dispatch::CommandPhase;
    use crate::telemetry::Protocol;

    fn records() -> Vec<CommandRecord> {
        vec![
            CommandRecord {
                setup_id: 1,
                phase: CommandPhase::Share,
                command: Command::Charging(ChargingProfile {
                    device_id: "cp1".to_string(),
                    connector_id: 0,
                    unit: RateUnit::A,
                    limit: 100.0,
                    protocol: Protocol::Ocpp201,
                }),
                accepted: true,
            },
            CommandRecord {
                setup_id: 1,
                phase: CommandPhase::Battery,
                command: Command::Battery {
                    device_id: "b1".to_string(),
                    power_kw: -5.0,
                },
                accepted: false,
            },
        ]
    }

    fn render(records: &[CommandRecord]) -> String {
        let mut buf = Vec::new();
        write_csv(records, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn writes_header_and_one_row_per_command() {
        let out = render(&records());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "1,cp1,charging,share,0,A,100.000,OCPP 2.0.1,true");
        assert_eq!(lines[2], "1,b1,battery,battery,,kW,-5.000,,false");
    }

    #[test]
    fn empty_log_has_only_header() {
        assert_eq!(render(&[]).lines().count(), 1);
    }

    #[test]
    fn rows_parse_back() {
        let out = render(&records());
        let mut rdr = csv::ReaderBuilder::new().from_reader(out.as_bytes());
        for record in rdr.records() {
            let rec = record.unwrap();
            assert_eq!(rec.len(), 9);
            assert!(rec[6].parse::<f64>().is_ok());
            assert!(rec[8].parse::<bool>().is_ok());
        }
    }
}
