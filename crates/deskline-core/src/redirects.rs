//! URL redirects: normalization, chain resolution, import and export

use chrono::{DateTime, Local};
use deskline_api::{BulkOutcome, NewRedirect, Redirect, RedirectResolution, REDIRECT_STATUS_CODES};
use deskline_store::{AuditEvent, AuditEventType, ContentStore, Store};
use deskline_util::{DeskError, RedirectId, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn is_absolute(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Canonical form of a request path.
///
/// Scheme and host are dropped, the path gets one leading slash, repeated
/// slashes collapse, a trailing slash is removed (except for `/`) and the path
/// is lowercased. The query string is kept as given; fragments are dropped.
pub fn normalize_path(input: &str) -> Result<String> {
    let mut rest = input.trim();
    if is_absolute(rest) {
        let after_scheme = &rest[rest.find("://").map_or(0, |i| i + 3)..];
        rest = after_scheme.find('/').map_or("/", |i| &after_scheme[i..]);
    }
    let rest = rest.split('#').next().unwrap_or_default();
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() && query.is_none() && input.trim().is_empty() {
        return Err(DeskError::field("path", "must not be empty"));
    }

    let mut normalized = format!("/{}", segments.join("/").to_lowercase());
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        normalized.push('?');
        normalized.push_str(query);
    }
    Ok(normalized)
}

/// Absolute URLs are kept as written, anything else is normalized as a path
pub fn normalize_target(input: &str) -> Result<String> {
    let target = input.trim();
    if target.is_empty() {
        return Err(DeskError::field("target", "must not be empty"));
    }
    if is_absolute(target) {
        Ok(target.to_string())
    } else {
        normalize_path(target)
    }
}

fn check_status_code(status_code: u16) -> Result<()> {
    if REDIRECT_STATUS_CODES.contains(&status_code) {
        Ok(())
    } else {
        Err(DeskError::field(
            "status_code",
            format!("{} is not one of {:?}", status_code, REDIRECT_STATUS_CODES),
        ))
    }
}

/// Import and export file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    Json,
}

impl FromStr for DataFormat {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(DataFormat::Csv),
            "json" => Ok(DataFormat::Json),
            other => Err(DeskError::field("format", format!("unknown format '{}'", other))),
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::Csv => f.write_str("csv"),
            DataFormat::Json => f.write_str("json"),
        }
    }
}

/// One row of an import file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportRow {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub status_code: Option<u16>,
}

/// One row of an export file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub source: String,
    pub target: String,
    pub status_code: u16,
    pub active: bool,
    pub hits: u64,
}

impl From<Redirect> for ExportRow {
    fn from(r: Redirect) -> Self {
        Self {
            source: r.source,
            target: r.target,
            status_code: r.status_code,
            active: r.active,
            hits: r.hits,
        }
    }
}

/// Redirect management and resolution
pub struct RedirectService {
    store: Arc<dyn Store>,
    max_hops: usize,
}

impl RedirectService {
    pub fn new(store: Arc<dyn Store>, max_hops: usize) -> Self {
        Self { store, max_hops }
    }

    /// Add a redirect. Rejects duplicate sources, self-redirects and targets
    /// whose chain leads back to the source.
    pub fn create(&self, redirect: NewRedirect) -> Result<Redirect> {
        let source = normalize_path(&redirect.source)?;
        let target = normalize_target(&redirect.target)?;
        check_status_code(redirect.status_code)?;
        if source == target {
            return Err(DeskError::field("target", "a redirect cannot point at its own source"));
        }
        self.check_chain(&source, &target)?;

        let created = self.store.insert_redirect(&NewRedirect {
            source,
            target,
            status_code: redirect.status_code,
        })?;
        self.audit_saved(&created);
        Ok(created)
    }

    /// Change target, status code or active flag
    pub fn update(&self, id: RedirectId, target: &str, status_code: u16, active: bool) -> Result<Redirect> {
        let existing = self
            .store
            .get_redirect(id)?
            .ok_or_else(|| DeskError::not_found(format!("redirect {}", id)))?;
        let target = normalize_target(target)?;
        check_status_code(status_code)?;
        if existing.source == target {
            return Err(DeskError::field("target", "a redirect cannot point at its own source"));
        }
        if active {
            self.check_chain(&existing.source, &target)?;
        }

        let updated = self.store.update_redirect(id, &target, status_code, active)?;
        self.audit_saved(&updated);
        Ok(updated)
    }

    pub fn delete(&self, id: RedirectId) -> Result<()> {
        if !self.store.delete_redirect(id)? {
            return Err(DeskError::not_found(format!("redirect {}", id)));
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Redirect>> {
        Ok(self.store.list_redirects()?)
    }

    fn audit_saved(&self, redirect: &Redirect) {
        info!(
            source = %redirect.source,
            target = %redirect.target,
            status_code = redirect.status_code,
            "Redirect saved"
        );
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::RedirectSaved {
            source: redirect.source.clone(),
            target: redirect.target.clone(),
            status_code: redirect.status_code,
        }));
    }

    /// Next active redirect from `url`; absolute URLs leave the site
    fn next_hop(&self, url: &str) -> Result<Option<Redirect>> {
        if is_absolute(url) {
            return Ok(None);
        }
        Ok(self.store.find_redirect(url)?.filter(|r| r.active))
    }

    /// Follow the chain starting at `target` and fail if it reaches `source`
    /// or runs past the hop limit
    fn check_chain(&self, source: &str, target: &str) -> Result<()> {
        let mut current = target.to_string();
        for _ in 0..self.max_hops {
            if current == source {
                return Err(DeskError::conflict(format!(
                    "redirecting '{}' to '{}' would create a loop",
                    source, target
                )));
            }
            match self.next_hop(&current)? {
                Some(next) => current = next.target,
                None => return Ok(()),
            }
        }
        Err(DeskError::conflict(format!(
            "redirect chain from '{}' exceeds {} hops",
            target, self.max_hops
        )))
    }

    /// Follow redirects from `path` to the final target.
    ///
    /// Counts a hit on the first redirect. Loops and chains longer than the
    /// hop limit are errors and record nothing.
    pub fn resolve(&self, path: &str, now: DateTime<Local>) -> Result<RedirectResolution> {
        let source = normalize_path(path)?;
        let first = self
            .next_hop(&source)?
            .ok_or_else(|| DeskError::not_found(format!("no redirect for '{}'", source)))?;

        let mut visited = HashSet::from([source.clone()]);
        let mut hops = Vec::new();
        let mut current = first.target.clone();

        loop {
            if !visited.insert(current.clone()) {
                warn!(source = %source, at = %current, "Redirect loop detected");
                return Err(DeskError::conflict(format!(
                    "redirect loop from '{}' revisits '{}'",
                    source, current
                )));
            }
            hops.push(current.clone());
            if hops.len() > self.max_hops {
                warn!(source = %source, max_hops = self.max_hops, "Redirect chain too long");
                return Err(DeskError::conflict(format!(
                    "redirect chain from '{}' exceeds {} hops",
                    source, self.max_hops
                )));
            }
            match self.next_hop(&current)? {
                Some(next) => current = next.target,
                None => break,
            }
        }

        self.store.record_redirect_hit(first.id, now)?;
        debug!(source = %source, target = %current, hops = hops.len(), "Redirect resolved");

        Ok(RedirectResolution {
            source,
            target: current,
            status_code: first.status_code,
            hops,
        })
    }

    /// Import redirects, validating each row on its own.
    ///
    /// A row whose source already redirects to the same target is skipped. A
    /// malformed JSON document fails as a whole; malformed CSV rows fail one by
    /// one.
    pub fn import(&self, data: &str, format: DataFormat) -> Result<BulkOutcome> {
        let rows: Vec<std::result::Result<ImportRow, String>> = match format {
            DataFormat::Csv => csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .from_reader(data.as_bytes())
                .deserialize()
                .map(|r| r.map_err(|e: csv::Error| e.to_string()))
                .collect(),
            DataFormat::Json => serde_json::from_str::<Vec<ImportRow>>(data)
                .map_err(|e| DeskError::field("json", e.to_string()))?
                .into_iter()
                .map(Ok)
                .collect(),
        };

        let mut outcome = BulkOutcome::default();
        for (i, row) in rows.into_iter().enumerate() {
            let item = format!("row {}", i + 1);
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    outcome.record_failed(item, e);
                    continue;
                }
            };
            match self.import_row(row) {
                Ok(true) => outcome.record_processed(),
                Ok(false) => outcome.record_skipped(),
                Err(e) => outcome.record_failed(item, e.to_string()),
            }
        }

        info!(
            format = %format,
            processed = outcome.processed,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "Redirects imported"
        );
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::RedirectsImported {
            processed: outcome.processed,
            skipped: outcome.skipped,
            failed: outcome.failed,
        }));
        Ok(outcome)
    }

    /// Ok(false) when an identical redirect already exists
    fn import_row(&self, row: ImportRow) -> Result<bool> {
        let source = normalize_path(&row.source)?;
        if let Some(existing) = self.store.find_redirect(&source)? {
            if existing.target == normalize_target(&row.target)? {
                return Ok(false);
            }
        }
        let mut redirect = NewRedirect::new(source, row.target);
        if let Some(code) = row.status_code {
            redirect.status_code = code;
        }
        self.create(redirect)?;
        Ok(true)
    }

    /// Every stored redirect in `format`
    pub fn export(&self, format: DataFormat) -> Result<String> {
        let rows: Vec<ExportRow> = self.list()?.into_iter().map(ExportRow::from).collect();
        match format {
            DataFormat::Csv => {
                let mut writer = csv::Writer::from_writer(vec![]);
                for row in &rows {
                    writer.serialize(row).map_err(|e| DeskError::internal(e.to_string()))?;
                }
                let bytes = writer.into_inner().map_err(|e| DeskError::internal(e.to_string()))?;
                String::from_utf8(bytes).map_err(|e| DeskError::internal(e.to_string()))
            }
            DataFormat::Json => serde_json::to_string_pretty(&rows).map_err(|e| DeskError::internal(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskline_store::SqliteStore;

    fn service() -> RedirectService {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        RedirectService::new(store, 10)
    }

    fn create(svc: &RedirectService, source: &str, target: &str) -> Redirect {
        svc.create(NewRedirect::new(source, target)).unwrap()
    }

    #[test]
    fn paths_normalize() {
        assert_eq!(normalize_path("Old-Page/").unwrap(), "/old-page");
        assert_eq!(normalize_path("//blog//2024///").unwrap(), "/blog/2024");
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path("/Search?Q=Rust").unwrap(), "/search?Q=Rust");
        assert_eq!(normalize_path("https://Example.com/About/#team").unwrap(), "/about");
        assert_eq!(normalize_path("http://example.com").unwrap(), "/");
        assert!(normalize_path("   ").is_err());

        assert_eq!(normalize_target("https://Other.org/X").unwrap(), "https://Other.org/X");
        assert_eq!(normalize_target("New/").unwrap(), "/new");
    }

    #[test]
    fn create_rejects_self_duplicate_and_loops() {
        let svc = service();
        assert!(matches!(
            svc.create(NewRedirect::new("/a", "/A/")),
            Err(DeskError::Validation(_))
        ));

        create(&svc, "/a", "/b");
        create(&svc, "/b", "/c");
        assert!(matches!(svc.create(NewRedirect::new("/a/", "/x")), Err(DeskError::Conflict(_))));

        let err = svc.create(NewRedirect::new("/c", "/a")).unwrap_err();
        assert!(matches!(&err, DeskError::Conflict(msg) if msg.contains("loop")));

        let mut bad = NewRedirect::new("/d", "/e");
        bad.status_code = 303;
        assert!(matches!(svc.create(bad), Err(DeskError::Validation(_))));
    }

    #[test]
    fn resolve_follows_chain_and_counts_first_hit() {
        let svc = service();
        let first = create(&svc, "/a", "/b");
        let mut second = NewRedirect::new("/b", "/c");
        second.status_code = 302;
        svc.create(second).unwrap();
        create(&svc, "/c", "https://elsewhere.example/landing");

        let now = deskline_util::now();
        let resolution = svc.resolve("/A/", now).unwrap();
        assert_eq!(resolution.source, "/a");
        assert_eq!(resolution.target, "https://elsewhere.example/landing");
        assert_eq!(resolution.hops, vec!["/b", "/c", "https://elsewhere.example/landing"]);
        assert_eq!(resolution.status_code, 301);

        let stored = svc.store.get_redirect(first.id).unwrap().unwrap();
        assert_eq!(stored.hits, 1);
        assert!(stored.last_hit_at.is_some());

        assert!(matches!(svc.resolve("/nowhere", now), Err(DeskError::NotFound(_))));
    }

    #[test]
    fn inactive_redirects_are_not_followed() {
        let svc = service();
        create(&svc, "/a", "/b");
        let b = create(&svc, "/b", "/c");
        svc.update(b.id, "/c", 301, false).unwrap();

        let resolution = svc.resolve("/a", deskline_util::now()).unwrap();
        assert_eq!(resolution.target, "/b");
        assert!(matches!(svc.resolve("/b", deskline_util::now()), Err(DeskError::NotFound(_))));
    }

    #[test]
    fn stored_loop_is_detected_without_hit() {
        let svc = service();
        // Bypass the service checks to simulate a loop already in the table
        let a = svc.store.insert_redirect(&NewRedirect::new("/a", "/b")).unwrap();
        svc.store.insert_redirect(&NewRedirect::new("/b", "/a")).unwrap();

        let err = svc.resolve("/a", deskline_util::now()).unwrap_err();
        assert!(matches!(&err, DeskError::Conflict(msg) if msg.contains("loop")));
        assert_eq!(svc.store.get_redirect(a.id).unwrap().unwrap().hits, 0);
    }

    #[test]
    fn long_chains_hit_the_bound() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let svc = RedirectService::new(store, 3);
        create(&svc, "/1", "/2");
        create(&svc, "/2", "/3");
        create(&svc, "/3", "/4");
        assert_eq!(svc.resolve("/1", deskline_util::now()).unwrap().hops.len(), 3);

        svc.store.insert_redirect(&NewRedirect::new("/4", "/5")).unwrap();
        let err = svc.resolve("/1", deskline_util::now()).unwrap_err();
        assert!(matches!(&err, DeskError::Conflict(msg) if msg.contains("exceeds 3 hops")));
    }

    #[test]
    fn update_checks_loops_and_self() {
        let svc = service();
        let a = create(&svc, "/a", "/b");
        create(&svc, "/b", "/c");

        let c = create(&svc, "/c", "/d");
        assert!(matches!(svc.update(c.id, "/a", 301, true), Err(DeskError::Conflict(_))));
        // An inactive redirect cannot close a loop
        svc.update(c.id, "/a", 301, false).unwrap();
        assert!(matches!(svc.update(a.id, "/a", 301, true), Err(DeskError::Validation(_))));
        assert!(matches!(
            svc.update(RedirectId::new(999), "/x", 301, true),
            Err(DeskError::NotFound(_))
        ));
    }

    #[test]
    fn resolving_any_source_terminates() {
        let svc = service();
        let pairs = [("/a", "/b"), ("/b", "/c"), ("/c", "/a"), ("/d", "/a"), ("/e", "/e"), ("/c", "/d")];
        for (source, target) in pairs {
            let _ = svc.create(NewRedirect::new(source, target));
        }
        for redirect in svc.list().unwrap() {
            let resolution = svc.resolve(&redirect.source, deskline_util::now()).unwrap();
            let unique: HashSet<&String> = resolution.hops.iter().collect();
            assert_eq!(unique.len(), resolution.hops.len());
            assert!(!resolution.hops.contains(&resolution.source));
        }
    }

    #[test]
    fn csv_import_tallies_rows() {
        let svc = service();
        create(&svc, "/existing", "/there");

        let data = "source,target,status_code\n\
                    /old,/new,301\n\
                    /existing,/there,\n\
                    /existing,/elsewhere,\n\
                    /temp,/promo,302\n\
                    /self,/self,\n\
                    /bad,/x,abc\n\
                    /new,/old,\n";
        let outcome = svc.import(data, DataFormat::Csv).unwrap();

        assert_eq!(outcome.requested, 7);
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.failed, 4);
        let failed_rows: Vec<&str> = outcome.errors.iter().map(|e| e.item.as_str()).collect();
        assert_eq!(failed_rows, vec!["row 3", "row 5", "row 6", "row 7"]);
        assert_eq!(svc.store.find_redirect("/temp").unwrap().unwrap().status_code, 302);
    }

    #[test]
    fn json_import_and_export() {
        let svc = service();
        let outcome = svc
            .import(
                r#"[{"source": "/a", "target": "/b"}, {"source": "/c", "target": "/d", "status_code": 308}]"#,
                DataFormat::Json,
            )
            .unwrap();
        assert_eq!(outcome.processed, 2);
        assert!(svc.import("{", DataFormat::Json).is_err());

        let csv = svc.export(DataFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("source,target,status_code,active,hits"));
        assert_eq!(lines.next(), Some("/a,/b,301,true,0"));
        assert_eq!(lines.next(), Some("/c,/d,308,true,0"));

        let json = svc.export(DataFormat::Json).unwrap();
        let rows: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(rows[1]["status_code"], 308);
    }

    #[test]
    fn format_parses() {
        assert_eq!("CSV".parse::<DataFormat>().unwrap(), DataFormat::Csv);
        assert_eq!("json".parse::<DataFormat>().unwrap(), DataFormat::Json);
        assert!("xml".parse::<DataFormat>().is_err());
    }
}
