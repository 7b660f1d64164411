//! Zone tables (CSV) and symbolic logic trees (TSV).
//!
//! Zone tables need an `id` (or `zoneid`) column and the Gutenberg-Richter
//! columns `mmin`, `mmax`, `a`, `b`; `stdb` and `stdmmax` default to zero.
//! Every other column becomes a zone attribute that symbolic models may
//! reference. Trees need `uncertaintyType` and `uncertaintyModel`;
//! `uncertaintyWeight` is optional and any other column is carried through
//! as an `applyTo*` style attribute.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};

use ltc_core::{AttributeValue, BranchSet, CollapsedZone, Zone};

use crate::error::{Result, StoreError};

const ID_COLUMNS: [&str; 2] = ["id", "zoneid"];
const REQUIRED_COLUMNS: [&str; 4] = ["mmin", "mmax", "a", "b"];
const OPTIONAL_COLUMNS: [&str; 2] = ["stdb", "stdmmax"];

const TYPE_COLUMN: &str = "uncertaintyType";
const MODEL_COLUMN: &str = "uncertaintyModel";
const WEIGHT_COLUMN: &str = "uncertaintyWeight";

fn column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn required_column(headers: &StringRecord, name: &str, table: &str) -> Result<usize> {
    column(headers, name)
        .ok_or_else(|| StoreError::InvalidData(format!("{table} has no `{name}` column")))
}

fn parse_number(record: &StringRecord, idx: usize, name: &str, row: usize) -> Result<f64> {
    let cell = record.get(idx).unwrap_or("");
    cell.parse::<f64>().map_err(|_| {
        StoreError::InvalidData(format!("row {row}: `{name}` is not a number: `{cell}`"))
    })
}

// --- Zones ---

pub fn read_zone_table(path: &Path) -> Result<Vec<Zone>> {
    let file = std::fs::File::open(path)?;
    let zones = read_zones(file)?;
    tracing::info!(path = %path.display(), zones = zones.len(), "read zone table");
    Ok(zones)
}

pub fn read_zones<R: io::Read>(reader: R) -> Result<Vec<Zone>> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();

    let id_idx = ID_COLUMNS
        .iter()
        .find_map(|name| column(&headers, name))
        .ok_or_else(|| StoreError::InvalidData("zone table has no `id` column".to_string()))?;
    let required = REQUIRED_COLUMNS
        .iter()
        .map(|name| required_column(&headers, name, "zone table"))
        .collect::<Result<Vec<_>>>()?;
    let optional: Vec<Option<usize>> = OPTIONAL_COLUMNS
        .iter()
        .map(|name| column(&headers, name))
        .collect();

    let core: BTreeSet<usize> = std::iter::once(id_idx)
        .chain(required.iter().copied())
        .chain(optional.iter().flatten().copied())
        .collect();

    let mut zones = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 2;
        let mut values = [0.0; 4];
        for (value, (&idx, name)) in values.iter_mut().zip(required.iter().zip(REQUIRED_COLUMNS)) {
            *value = parse_number(&record, idx, name, row)?;
        }
        let [mmin, mmax, a, b] = values;

        let mut uncertainty = [0.0; 2];
        for (value, (idx, name)) in uncertainty
            .iter_mut()
            .zip(optional.iter().zip(OPTIONAL_COLUMNS))
        {
            if let Some(idx) = idx
                && !record.get(*idx).unwrap_or("").is_empty()
            {
                *value = parse_number(&record, *idx, name, row)?;
            }
        }

        let id = record.get(id_idx).unwrap_or("").to_string();
        if id.is_empty() {
            return Err(StoreError::InvalidData(format!("row {row}: empty zone id")));
        }

        let mut zone = Zone::new(id, mmin, mmax, a, b).with_uncertainty(uncertainty[0], uncertainty[1]);
        for (idx, (name, cell)) in headers.iter().zip(record.iter()).enumerate() {
            if core.contains(&idx) || cell.is_empty() {
                continue;
            }
            zone = zone.with_attribute(name, AttributeValue::from_cell(cell));
        }
        zones.push(zone);
    }
    Ok(zones)
}

/// Write collapsed zones with their `occurRates` (space separated) and
/// `magBin` columns appended.
pub fn write_zone_table(path: &Path, zones: &[CollapsedZone]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_zones(file, zones)?;
    tracing::info!(path = %path.display(), zones = zones.len(), "wrote zone table");
    Ok(())
}

pub fn write_zones<W: io::Write>(writer: W, zones: &[CollapsedZone]) -> Result<()> {
    let attributes: BTreeSet<&str> = zones
        .iter()
        .flat_map(|z| z.zone.attributes.keys().map(String::as_str))
        .collect();

    let mut writer = WriterBuilder::new().from_writer(writer);
    let mut header = vec!["id", "mmin", "mmax", "a", "b", "stdb", "stdmmax"];
    header.extend(attributes.iter().copied());
    header.extend(["occurRates", "magBin"]);
    writer.write_record(&header)?;

    for collapsed in zones {
        let zone = &collapsed.zone;
        let mut record = vec![
            zone.id.clone(),
            zone.mmin.to_string(),
            zone.mmax.to_string(),
            zone.a.to_string(),
            zone.b.to_string(),
            zone.stdb.to_string(),
            zone.stdmmax.to_string(),
        ];
        record.extend(attributes.iter().map(|name| {
            zone.attributes
                .get(*name)
                .map(|v| v.to_string())
                .unwrap_or_default()
        }));
        let rates: Vec<String> = collapsed.occur_rates.iter().map(|r| r.to_string()).collect();
        record.push(rates.join(" "));
        record.push(collapsed.mag_bin.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

// --- Trees ---

/// Parse an `uncertaintyWeight` cell: a bracketed list or a bare number.
fn parse_weights(cell: &str, row: usize) -> Result<Option<Vec<f64>>> {
    let inner = cell.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return Ok(None);
    }
    inner
        .split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(|w| {
            w.parse::<f64>().map_err(|_| {
                StoreError::InvalidData(format!("row {row}: invalid weight `{w}`"))
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

pub fn read_tree_tsv(path: &Path) -> Result<Vec<BranchSet>> {
    let file = std::fs::File::open(path)?;
    let tree = read_tree(file)?;
    tracing::info!(path = %path.display(), branch_sets = tree.len(), "read logic tree");
    Ok(tree)
}

pub fn read_tree<R: io::Read>(reader: R) -> Result<Vec<BranchSet>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(Trim::All)
        .quoting(false)
        .from_reader(reader);
    let headers = reader.headers()?.clone();

    let type_idx = required_column(&headers, TYPE_COLUMN, "logic tree")?;
    let model_idx = required_column(&headers, MODEL_COLUMN, "logic tree")?;
    let weight_idx = column(&headers, WEIGHT_COLUMN);

    let mut tree = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 2;
        let kind = record.get(type_idx).unwrap_or("");
        let models = record.get(model_idx).unwrap_or("");
        let weights = match weight_idx.and_then(|idx| record.get(idx)) {
            Some(cell) => parse_weights(cell, row)?,
            None => None,
        };

        let mut branch_set = BranchSet::parse(kind, models, weights.as_deref())
            .map_err(|e| StoreError::InvalidData(format!("row {row}: {e}")))?;
        for (idx, (name, cell)) in headers.iter().zip(record.iter()).enumerate() {
            if idx == type_idx || idx == model_idx || Some(idx) == weight_idx || cell.is_empty() {
                continue;
            }
            branch_set = branch_set.with_apply_to(name, cell);
        }
        tree.push(branch_set);
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltc_core::UncertaintyKind;

    const ZONES: &str = "\
zoneid,mmin,mmax,a,b,stdb,stdmmax,region,stda
ZA,4.5,7.5,4.1,1.0,0.1,0.3,craton,0.05
ZB,4.5,0,3.0,1.0,,,rift,
";

    const TREE: &str = "\
uncertaintyType\tuncertaintyModel\tuncertaintyWeight\tapplyToSources
bGRRelative\t['-stdb', 0, 'stdb']\t[0.2, 0.6, 0.2]\tall
maxMagGRAbsolute\t['mmax - stdmmax', 'mmax']\t\tall
gmpeModel\t['Toro2002', 'Campbell2003']\t[0.4, 0.6]\t
";

    #[test]
    fn test_read_zones() {
        let zones = read_zones(ZONES.as_bytes()).unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].id, "ZA");
        assert_eq!(zones[0].stdmmax, 0.3);
        assert_eq!(zones[0].get("stda"), Some(AttributeValue::Number(0.05)));
        assert_eq!(zones[0].get("region"), Some(AttributeValue::Text("craton".into())));
        assert!(!zones[1].is_active());
        assert_eq!(zones[1].stdb, 0.0);
        assert_eq!(zones[1].get("stda"), None);
    }

    #[test]
    fn test_read_zones_missing_column() {
        let err = read_zones("id,mmin,mmax,a\nZ,4.5,7,4\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("`b`"));
    }

    #[test]
    fn test_read_zones_bad_number() {
        let err = read_zones("id,mmin,mmax,a,b\nZ,4.5,high,4,1\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_read_tree() {
        let tree = read_tree(TREE.as_bytes()).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree[0].kind(), &UncertaintyKind::BGrRelative);
        assert_eq!(tree[0].weights(), &[0.2, 0.6, 0.2]);
        assert_eq!(tree[0].apply_to()["applyToSources"], "all");
        assert_eq!(tree[1].weights(), &[0.5, 0.5]);
        assert_eq!(tree[2].models().labels(), vec!["Toro2002", "Campbell2003"]);
        assert!(tree[2].apply_to().is_empty());
    }

    #[test]
    fn test_read_tree_bad_model() {
        let text = "uncertaintyType\tuncertaintyModel\nbGRRelative\t[0.1, (]\n";
        let err = read_tree(text.as_bytes()).unwrap_err();
        assert!(err.to_string().starts_with("invalid data: row 2"));
    }

    #[test]
    fn test_write_zones() {
        let zones = read_zones(ZONES.as_bytes()).unwrap();
        let collapsed = vec![CollapsedZone {
            zone: zones[0].clone(),
            occur_rates: vec![0.012, 0.0034],
            mag_bin: 0.1,
        }];
        let mut out = Vec::new();
        write_zones(&mut out, &collapsed).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("id,mmin,mmax,a,b,stdb,stdmmax,region,stda,occurRates,magBin")
        );
        assert_eq!(
            lines.next(),
            Some("ZA,4.5,7.5,4.1,1,0.1,0.3,craton,0.05,0.012 0.0034,0.1")
        );

        let reread = read_zones(text.as_bytes()).unwrap();
        assert_eq!(
            reread[0].get("occurRates"),
            Some(AttributeValue::Text("0.012 0.0034".into()))
        );
    }
}
