//! Printer name resolution.
//!
//! Operators pick printers by a short display name. The directory maps those
//! names to fully qualified identities. It is built once from the driver's
//! enumeration and is read-only afterwards.

use tracing::{info, instrument};

use super::{PrinterIdentity, PrinterScope};
use crate::device::PrinterDriver;
use crate::error::CardError;

/// Display name → printer identity, in enumeration order.
#[derive(Debug, Clone, Default)]
pub struct PrinterDirectory {
    entries: Vec<(String, PrinterIdentity)>,
}

impl PrinterDirectory {
    /// Enumerate `scope` through `driver`.
    #[instrument(skip(driver), fields(driver = driver.name()))]
    pub fn build(driver: &dyn PrinterDriver, scope: &PrinterScope) -> Result<Self, CardError> {
        let names = driver.enumerate(scope)?;
        let directory = Self::from_names(scope, names);
        info!(printers = directory.len(), "Printer directory built");
        Ok(directory)
    }

    /// Build from already enumerated names, applying the scope's filter.
    ///
    /// Duplicate display names keep their first position and the last
    /// identity seen.
    pub fn from_names<I>(scope: &PrinterScope, names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let filter = scope.filter().map(str::to_lowercase);
        let mut entries: Vec<(String, PrinterIdentity)> = Vec::new();

        for name in names {
            if let Some(filter) = &filter
                && !name.to_lowercase().contains(filter.as_str())
            {
                continue;
            }
            let identity = PrinterIdentity::new(name);
            let display = match scope {
                PrinterScope::Local { .. } => identity.as_str().to_string(),
                PrinterScope::Server { .. } => identity.display_name().to_string(),
            };
            match entries.iter_mut().find(|(d, _)| *d == display) {
                Some(entry) => entry.1 = identity,
                None => entries.push((display, identity)),
            }
        }

        Self { entries }
    }

    pub fn get(&self, display_name: &str) -> Option<&PrinterIdentity> {
        self.entries
            .iter()
            .find(|(d, _)| d == display_name)
            .map(|(_, identity)| identity)
    }

    /// Resolve a display name, treating unknown names as identities.
    pub fn resolve(&self, display_name: &str) -> PrinterIdentity {
        self.get(display_name)
            .cloned()
            .unwrap_or_else(|| PrinterIdentity::new(display_name))
    }

    pub fn display_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(d, _)| d.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PrinterIdentity)> {
        self.entries.iter().map(|(d, p)| (d.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_scope() -> PrinterScope {
        PrinterScope::Server {
            server: "\\\\printserver".to_string(),
            filter: "card printer".to_string(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_server_names_are_shortened_and_filtered() {
        let directory = PrinterDirectory::from_names(
            &server_scope(),
            names(&[
                "\\\\printserver\\Card Printer 1",
                "\\\\printserver\\Laser 3rd Floor",
                "\\\\printserver\\CARD PRINTER 2",
            ]),
        );

        assert_eq!(
            directory.display_names().collect::<Vec<_>>(),
            vec!["Card Printer 1", "CARD PRINTER 2"]
        );
        assert_eq!(
            directory.get("Card Printer 1").unwrap().as_str(),
            "\\\\printserver\\Card Printer 1"
        );
    }

    #[test]
    fn test_local_names_map_to_themselves() {
        let directory =
            PrinterDirectory::from_names(&PrinterScope::default(), names(&["Evolis Primacy"]));
        assert_eq!(directory.resolve("Evolis Primacy").as_str(), "Evolis Primacy");
    }

    #[test]
    fn test_duplicate_display_names_deduplicated() {
        let directory = PrinterDirectory::from_names(
            &server_scope(),
            names(&["\\\\a\\Card Printer", "\\\\b\\Card Printer"]),
        );
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.resolve("Card Printer").as_str(), "\\\\b\\Card Printer");
    }

    #[test]
    fn test_unknown_display_name_resolves_to_itself() {
        let directory = PrinterDirectory::default();
        assert!(directory.is_empty());
        assert_eq!(directory.resolve("Mystery").as_str(), "Mystery");
    }
}
