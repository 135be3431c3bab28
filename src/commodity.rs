// ===============================
// src/commodity.rs (static lookup: commodity names & requirement templates)
// ===============================
//
// - FDevIDs commodity.csv / rare_commodity.csv : symbol -> (category, name)
// - requirements.csv                           : tipe konstruksi -> ton per commodity
//
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ahash::AHashMap as HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::construction::ResourceDemand;

#[derive(Debug, Error)]
pub enum CommodityError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: missing column {column}")]
    MissingColumn { path: PathBuf, column: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commodity {
    pub symbol: String,
    pub category: String,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct CommodityTable {
    by_symbol: HashMap<String, Commodity>,
}

impl CommodityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load whichever of commodity.csv / rare_commodity.csv exist in `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self, CommodityError> {
        let mut table = Self::new();
        for file in ["commodity.csv", "rare_commodity.csv"] {
            let path = dir.join(file);
            if !path.is_file() {
                debug!(path = %path.display(), "commodity file not found, skipped");
                continue;
            }
            let text = fs::read_to_string(&path)
                .map_err(|source| CommodityError::Io { path: path.clone(), source })?;
            table.extend_from_csv(&path, &text)?;
        }
        info!(commodities = table.len(), "commodity table loaded");
        Ok(table)
    }

    pub fn extend_from_csv(&mut self, path: &Path, text: &str) -> Result<(), CommodityError> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = lines.next().map(split_csv_line).unwrap_or_default();
        let col = |name: &'static str| {
            header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or(CommodityError::MissingColumn { path: path.to_path_buf(), column: name })
        };
        let (sym_i, cat_i, name_i) = (col("symbol")?, col("category")?, col("name")?);

        for line in lines {
            let fields = split_csv_line(line);
            let Some(symbol) = fields.get(sym_i).map(|s| s.trim()).filter(|s| !s.is_empty()) else {
                continue;
            };
            let name = fields
                .get(name_i)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .unwrap_or(symbol);
            self.insert(Commodity {
                symbol: symbol.to_lowercase(),
                category: fields.get(cat_i).map(|s| s.trim().to_string()).unwrap_or_default(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn insert(&mut self, c: Commodity) {
        self.by_symbol.insert(c.symbol.clone(), c);
    }

    pub fn get(&self, symbol: &str) -> Option<&Commodity> {
        self.by_symbol.get(symbol)
    }

    /// Unknown symbols are shown as-is.
    pub fn display_name(&self, symbol: &str) -> String {
        self.get(symbol)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| symbol.to_string())
    }

    pub fn category(&self, symbol: &str) -> String {
        self.get(symbol).map(|c| c.category.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}

/// Requirement templates for planning sites by construction type.
#[derive(Debug, Clone, Default)]
pub struct RequirementTemplates {
    templates: Vec<(String, BTreeMap<String, i64>)>,
}

impl RequirementTemplates {
    pub fn load(path: &Path) -> Result<Self, CommodityError> {
        let text = fs::read_to_string(path)
            .map_err(|source| CommodityError::Io { path: path.to_path_buf(), source })?;
        Self::from_csv(path, &text)
    }

    /// Header is `type,<Commodity>,<Commodity>,...`; blank cells mean "not needed".
    pub fn from_csv(path: &Path, text: &str) -> Result<Self, CommodityError> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = lines.next().map(split_csv_line).unwrap_or_default();
        let type_i = header
            .iter()
            .position(|h| h.trim() == "type")
            .ok_or(CommodityError::MissingColumn { path: path.to_path_buf(), column: "type" })?;

        let mut templates = Vec::new();
        for line in lines {
            let fields = split_csv_line(line);
            let Some(kind) = fields.get(type_i).map(|s| s.trim().to_string()) else { continue };
            let mut needed = BTreeMap::new();
            for (i, cell) in fields.iter().enumerate() {
                if i == type_i {
                    continue;
                }
                let (Some(column), Ok(qty)) = (header.get(i), cell.trim().parse::<i64>()) else {
                    continue;
                };
                needed.insert(column.trim().to_lowercase(), qty);
            }
            templates.push((kind, needed));
        }
        Ok(Self { templates })
    }

    pub fn types(&self) -> Vec<&str> {
        self.templates.iter().map(|(t, _)| t.as_str()).collect()
    }

    pub fn get(&self, kind: &str) -> Option<BTreeMap<String, ResourceDemand>> {
        self.templates.iter().find(|(t, _)| t == kind).map(|(_, needed)| {
            needed
                .iter()
                .map(|(k, q)| (k.clone(), ResourceDemand::new(*q, 0, 0)))
                .collect()
        })
    }

    /// Every commodity any template mentions, sorted.
    pub fn commodities(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .templates
            .iter()
            .flat_map(|(_, n)| n.keys().cloned())
            .collect();
        all.sort();
        all.dedup();
        all
    }
}

// Cukup untuk file FDevIDs: koma sebagai pemisah, "..." untuk field yang berisi koma,
// "" di dalam field ber-quote. Quote di tengah field biasa dianggap literal.
fn split_csv_line(line: &str) -> Vec<String> {
    let line = line.strip_prefix('\u{feff}').unwrap_or(line);
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    let mut at_start = true;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cur.push('"');
                chars.next();
            }
            '"' if quoted => quoted = false,
            '"' if at_start => quoted = true,
            ',' if !quoted => {
                out.push(std::mem::take(&mut cur));
                at_start = true;
                continue;
            }
            _ => cur.push(c),
        }
        at_start = false;
    }
    out.push(cur);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMODITY_CSV: &str = "id,symbol,category,name\n\
        128049202,Steel,Metals,Steel\n\
        128049204,CMMComposite,Industrial Materials,CMM Composite\n\
        128064028,EmergencyPowerCells,Technology,\"Emergency Power Cells\"\n";

    #[test]
    fn loads_symbols_lower_cased() {
        let mut t = CommodityTable::new();
        t.extend_from_csv(Path::new("commodity.csv"), COMMODITY_CSV).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.display_name("cmmcomposite"), "CMM Composite");
        assert_eq!(t.category("steel"), "Metals");
        assert_eq!(t.display_name("emergencypowercells"), "Emergency Power Cells");
        assert_eq!(t.display_name("unobtainium"), "unobtainium");
        assert_eq!(t.category("unobtainium"), "");
    }

    #[test]
    fn missing_column_is_an_error() {
        let mut t = CommodityTable::new();
        let err = t.extend_from_csv(Path::new("x.csv"), "id,symbol\n1,steel\n").unwrap_err();
        assert!(matches!(err, CommodityError::MissingColumn { column: "category", .. }));
    }

    #[test]
    fn load_dir_skips_missing_files() {
        let dir = tempfile::tempdir().expect("tmpdir");
        fs::write(dir.path().join("commodity.csv"), COMMODITY_CSV).unwrap();
        let t = CommodityTable::load_dir(dir.path()).expect("load");
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn requirement_templates() {
        let csv = "type,Steel,Titanium,CMMComposite\n\
                   Outpost,100,,20\n\
                   Starport,500,40,\n";
        let r = RequirementTemplates::from_csv(Path::new("requirements.csv"), csv).unwrap();
        assert_eq!(r.types(), vec!["Outpost", "Starport"]);
        let outpost = r.get("Outpost").unwrap();
        assert_eq!(outpost["steel"].required, 100);
        assert!(!outpost.contains_key("titanium"));
        assert!(r.get("Megaship").is_none());
        assert_eq!(r.commodities(), vec!["cmmcomposite", "steel", "titanium"]);
    }

    #[test]
    fn csv_split_handles_quotes() {
        assert_eq!(split_csv_line(r#"a,"b,c",d"#), vec!["a", "b,c", "d"]);
        assert_eq!(split_csv_line(r#""say ""hi""",x"#), vec![r#"say "hi""#, "x"]);
        assert_eq!(split_csv_line(r#"a,5" Gun,"""quoted"", b",,"#), vec!["a", r#"5" Gun"#, r#""quoted", b"#, "", ""]);
    }

    #[test]
    fn header_with_bom_and_padding() {
        let text = "\u{feff}id, symbol ,category,name\n128049202,Steel,Metals,Steel\n";
        let mut t = CommodityTable::new();
        t.extend_from_csv(Path::new("commodity.csv"), text).unwrap();
        assert_eq!(t.display_name("steel"), "Steel");
        assert_eq!(split_csv_line("\u{feff}type,Steel"), vec!["type", "Steel"]);
    }
}
