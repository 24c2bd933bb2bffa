//! Manifest query endpoints.
//!
//! Facet filters are repeatable query parameters (`?archs=x86&archs=amd64`),
//! so the query string is decoded by hand rather than through serde.

use std::sync::Arc;

use axum::extract::{RawQuery, State};
use axum::Json;
use url::form_urlencoded;

use manifest::{Criteria, FacetValues, ManifestIndex, Page, Record, Sort, SortKey};

use crate::server::error::ApiError;
use crate::server::ServerState;

/// Decoded query string shared by the `/os` endpoints.
#[derive(Debug, Default)]
pub(crate) struct OsQuery {
    criteria: Criteria,
    asc_by: Option<String>,
    desc_by: Option<String>,
    size: Option<String>,
    page: Option<String>,
}

impl OsQuery {
    /// Unknown keys are ignored. For single-valued keys the last one wins.
    pub(crate) fn parse(raw: Option<&str>) -> Self {
        let mut query = Self::default();
        let Some(raw) = raw else {
            return query;
        };
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            let value = value.into_owned();
            let criteria = &mut query.criteria;
            match key.as_ref() {
                "variants" => criteria.variants.push(value),
                "names" => criteria.names.push(value),
                "versions" => criteria.versions.push(value),
                "diskSizes" | "disketteSizes" => criteria.disk_sizes.push(value),
                "floppySizes" => criteria.floppy_sizes.push(value),
                "archs" => criteria.archs.push(value),
                "tags" => criteria.tags.push(value),
                "search" => criteria.search = Some(value),
                "ascBy" => query.asc_by = Some(value),
                "descBy" => query.desc_by = Some(value),
                "size" => query.size = Some(value),
                "page" => query.page = Some(value),
                _ => {}
            }
        }
        query
    }

    pub(crate) fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// `ascBy` names the key if present, otherwise `descBy`; the order is
    /// descending whenever `descBy` is given. Unknown keys leave results
    /// unsorted.
    pub(crate) fn sort(&self) -> Option<Sort> {
        let field = self.asc_by.as_deref().or(self.desc_by.as_deref())?;
        let key = SortKey::from_field(field)?;
        Some(Sort {
            key,
            descending: self.desc_by.is_some(),
        })
    }

    pub(crate) fn page(&self) -> Result<Page, ApiError> {
        let size = match self.size.as_deref() {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                ApiError::bad_request(format!(
                    "size must be an integer between 1 and {}, got {raw:?}",
                    Page::MAX_SIZE
                ))
            })?,
            None => Page::DEFAULT_SIZE,
        };
        let index = match self.page.as_deref() {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                ApiError::bad_request(format!("page must be a non-negative integer, got {raw:?}"))
            })?,
            None => 0,
        };
        Ok(Page::new(size, index)?)
    }
}

/// Runs a query against the index off the async workers.
async fn with_index<T, F>(state: &ServerState, query: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ManifestIndex) -> T + Send + 'static,
{
    let index = state.index.clone();
    tokio::task::spawn_blocking(move || query(&index))
        .await
        .map_err(|error| ApiError::internal(format!("task failed: {error}")))
}

/// GET /os/params/
///
/// Returns the values still selectable for each facet.
pub(crate) async fn params(
    State(state): State<Arc<ServerState>>,
    RawQuery(raw): RawQuery,
) -> Result<Json<FacetValues>, ApiError> {
    let query = OsQuery::parse(raw.as_deref());
    let values = with_index(&state, move |index| index.params(query.criteria())).await?;
    Ok(Json(values))
}

/// GET /os/count/
///
/// Returns the number of matching records.
pub(crate) async fn count(
    State(state): State<Arc<ServerState>>,
    RawQuery(raw): RawQuery,
) -> Result<Json<usize>, ApiError> {
    let query = OsQuery::parse(raw.as_deref());
    let count = with_index(&state, move |index| index.count(query.criteria())).await?;
    Ok(Json(count))
}

/// GET /os/
///
/// Returns one page of matching records.
pub(crate) async fn list(
    State(state): State<Arc<ServerState>>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Vec<Arc<Record>>>, ApiError> {
    let query = OsQuery::parse(raw.as_deref());
    let page = query.page()?;
    let sort = query.sort();
    let records = with_index(&state, move |index| index.list(query.criteria(), sort, page)).await?;
    Ok(Json(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use manifest::ArchiveLayout;
    use std::fs::{self, File};
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap();
    }

    fn state() -> (TempDir, Arc<ServerState>) {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "os/pc/Linux/Ubuntu_20.04_amd64.iso");
        touch(temp.path(), "os/pc/Linux/Ubuntu_22.04_amd64,arm64.iso");
        touch(temp.path(), "os/pc/Linux/Fedora_38_x86.iso");
        touch(temp.path(), "os/pc/DOS/MS-DOS_6.22_3.5_1.44MB_x86_Disk1.img");
        touch(temp.path(), "os/pc/DOS/FreeDOS_1.3_x86_live.iso");

        let index = ManifestIndex::new(ArchiveLayout::new(temp.path(), "https://dl.example.org"));
        index.store().scan(index.layout()).unwrap();
        (temp, Arc::new(ServerState::new(Arc::new(index))))
    }

    fn raw(query: &str) -> RawQuery {
        RawQuery(Some(query.to_string()))
    }

    #[test]
    fn parse_collects_repeated_and_aliased_keys() {
        let query = OsQuery::parse(Some(
            "archs=x86&archs=amd64&disketteSizes=3.5&diskSizes=5.25&search=free%20dos&unknown=1",
        ));
        assert_eq!(query.criteria().archs, vec!["x86", "amd64"]);
        assert_eq!(query.criteria().disk_sizes, vec!["3.5", "5.25"]);
        assert_eq!(query.criteria().search.as_deref(), Some("free dos"));
    }

    #[test]
    fn sort_prefers_asc_by_and_descends_with_desc_by() {
        let asc = OsQuery::parse(Some("ascBy=version"));
        assert_eq!(asc.sort(), Some(Sort::ascending(SortKey::Version)));

        let desc = OsQuery::parse(Some("descBy=size"));
        assert_eq!(desc.sort(), Some(Sort::descending(SortKey::SizeBytes)));

        let both = OsQuery::parse(Some("ascBy=name&descBy=version"));
        assert_eq!(both.sort(), Some(Sort::descending(SortKey::Name)));

        assert_eq!(OsQuery::parse(Some("ascBy=bogus")).sort(), None);
        assert_eq!(OsQuery::parse(None).sort(), None);
    }

    #[test]
    fn page_validation() {
        assert_eq!(OsQuery::parse(None).page().unwrap(), Page::default());
        assert_eq!(
            OsQuery::parse(Some("size=100&page=3")).page().unwrap(),
            Page::new(100, 3).unwrap()
        );
        for bad in ["size=0", "size=101", "size=ten", "page=-1", "page=x"] {
            let error = OsQuery::parse(Some(bad)).page().unwrap_err();
            assert_eq!(error.status(), StatusCode::BAD_REQUEST, "{bad}");
        }
    }

    #[tokio::test]
    async fn list_returns_the_requested_page() {
        let (_temp, state) = state();
        let Json(records) = list(State(state), raw("names=Ubuntu&ascBy=version&size=1&page=1"))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].version, "22.04");
    }

    #[tokio::test]
    async fn list_rejects_bad_page_size() {
        let (_temp, state) = state();
        let error = list(State(state), raw("size=500")).await.unwrap_err();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn count_applies_filters_and_search() {
        let (_temp, state) = state();
        let Json(all) = count(State(state.clone()), RawQuery(None)).await.unwrap();
        assert_eq!(all, 5);
        let Json(dos) = count(State(state.clone()), raw("variants=DOS")).await.unwrap();
        assert_eq!(dos, 2);
        let Json(live) = count(State(state), raw("search=LIVE")).await.unwrap();
        assert_eq!(live, 1);
    }

    #[tokio::test]
    async fn params_narrow_by_earlier_facets() {
        let (_temp, state) = state();
        let Json(values) = params(State(state), raw("variants=DOS")).await.unwrap();
        assert_eq!(values.variants, vec!["DOS", "Linux"]);
        assert_eq!(values.names, vec!["FreeDOS", "MS-DOS"]);
        assert_eq!(values.tags, vec!["Disk1", "live"]);
        let json = serde_json::to_value(&values).unwrap();
        assert_eq!(json["diskSizes"], serde_json::json!(["3.5"]));
        assert_eq!(json["floppySizes"], serde_json::json!(["1.44MB"]));
    }
}
