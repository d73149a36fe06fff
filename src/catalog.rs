//! Class-id to display-name catalog.
//!
//! One entry per line: `<id><whitespace><display name>`. The name is the rest of
//! the line and may contain spaces. The catalog only annotates output; it never
//! influences the person decision.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Clone, Debug, Default)]
pub struct LabelCatalog {
    labels: HashMap<u32, String>,
}

impl LabelCatalog {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::config(format!("label catalog {} not found", path.display()))
            } else {
                Error::io(path, e)
            }
        })?;
        let catalog = Self::parse(&raw)?;
        log::info!(
            "loaded {} labels from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Parse catalog text. Later duplicates replace earlier ones.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut labels = HashMap::new();
        for (idx, row) in raw.lines().enumerate() {
            let line = idx + 1;
            let row = row.trim();
            if row.is_empty() {
                continue;
            }
            let (id, name) = split_entry(row).ok_or_else(|| Error::MalformedCatalogEntry {
                line,
                content: row.to_string(),
            })?;
            log::debug!("label {} = {}", id, name);
            if let Some(previous) = labels.insert(id, name.to_string()) {
                log::warn!(
                    "DuplicateCatalogEntry: id {} on line {} replaces {:?} with {:?}",
                    id,
                    line,
                    previous,
                    name
                );
            }
        }
        Ok(Self { labels })
    }

    pub fn lookup(&self, class_id: u32) -> Result<&str> {
        self.labels
            .get(&class_id)
            .map(String::as_str)
            .ok_or(Error::UnknownClassId(class_id))
    }

    /// Name to show in the overlay. Unknown ids degrade to the bare id.
    pub fn display_name(&self, class_id: u32) -> String {
        match self.lookup(class_id) {
            Ok(name) => name.to_string(),
            Err(err) => {
                log::debug!("{}; labelling by id", err);
                class_id.to_string()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn split_entry(row: &str) -> Option<(u32, &str)> {
    let (id, rest) = row.split_once(char::is_whitespace)?;
    let name = rest.trim();
    if name.is_empty() {
        return None;
    }
    let id = id.parse::<u32>().ok()?;
    Some((id, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_and_unknown_ids() -> Result<()> {
        let catalog = LabelCatalog::parse("0 person\n1 car\n")?;
        assert_eq!(catalog.lookup(0)?, "person");
        assert_eq!(catalog.lookup(1)?, "car");
        assert!(matches!(catalog.lookup(99), Err(Error::UnknownClassId(99))));
        Ok(())
    }

    #[test]
    fn names_keep_internal_spaces() -> Result<()> {
        let catalog = LabelCatalog::parse("10 fire hydrant\n12   stop  sign  \n")?;
        assert_eq!(catalog.lookup(10)?, "fire hydrant");
        assert_eq!(catalog.lookup(12)?, "stop  sign");
        Ok(())
    }

    #[test]
    fn tab_separated_entries_parse() -> Result<()> {
        let catalog = LabelCatalog::parse("3\tmotorcycle\r\n")?;
        assert_eq!(catalog.lookup(3)?, "motorcycle");
        Ok(())
    }

    #[test]
    fn duplicate_ids_keep_last_occurrence() -> Result<()> {
        let catalog = LabelCatalog::parse("0 person\n0 pedestrian\n")?;
        assert_eq!(catalog.lookup(0)?, "pedestrian");
        assert_eq!(catalog.len(), 1);
        Ok(())
    }

    #[test]
    fn single_token_line_is_malformed() {
        let err = LabelCatalog::parse("0 person\n1\n").unwrap_err();
        match err {
            Error::MalformedCatalogEntry { line, content } => {
                assert_eq!(line, 2);
                assert_eq!(content, "1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_numeric_id_is_malformed() {
        assert!(matches!(
            LabelCatalog::parse("person 0"),
            Err(Error::MalformedCatalogEntry { line: 1, .. })
        ));
        assert!(matches!(
            LabelCatalog::parse("-1 ghost"),
            Err(Error::MalformedCatalogEntry { .. })
        ));
    }

    #[test]
    fn display_name_degrades_to_id() -> Result<()> {
        let catalog = LabelCatalog::parse("0 person")?;
        assert_eq!(catalog.display_name(0), "person");
        assert_eq!(catalog.display_name(77), "77");
        Ok(())
    }
}
