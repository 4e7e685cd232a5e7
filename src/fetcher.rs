// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Result retrieval for succeeded jobs.
//
// A job writes its result sets as `{resultLocation}/_0.dolphin`,
// `_1.dolphin`, ... They are listed through
//     GET /filesystem/getDirFileTrees?path={resultLocation}
//     -> {"dirFileTrees": {"path": "...", "children": [{"name": "_0.dolphin", "path": "..."}]}}
// and each one is read through
//     GET /filesystem/openFile?path=...&page=N&pageSize=M
// which returns
//     {"metadata": [{"columnName": "id", "dataType": "int", "comment": ""}] | "NULL",
//      "fileContent": [[...], ...], "type": "2", "totalLine": 30}

use crate::client::LinkisClient;
use crate::error::{LinkisError, Result};
use crate::models::{same_schema, Column, ResultSet, ResultTable, Task, TaskStatus};
use crate::transport::ApiRequest;
use serde_json::Value;

/// Column name given to the single column of text (non-tabular) result sets
pub const TEXT_COLUMN: &str = "value";

fn result_set_path(location: &str, index: usize) -> String {
    format!("{}/_{}.dolphin", location.trim_end_matches('/'), index)
}

/// Index `N` of a `_N.dolphin` file name.
fn result_set_index(name: &str) -> Option<usize> {
    name.strip_prefix('_')?
        .strip_suffix(".dolphin")?
        .parse()
        .ok()
}

/// Result-set files of a directory listing, ordered by index.
fn parse_listing(data: &Value) -> Vec<(usize, String)> {
    let children = data
        .pointer("/dirFileTrees/children")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut sets: Vec<(usize, String)> = children
        .iter()
        .filter_map(|child| {
            let path = child.get("path").and_then(Value::as_str)?;
            let name = child
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(path));
            Some((result_set_index(name)?, path.to_string()))
        })
        .collect();
    sets.sort_by_key(|(index, _)| *index);
    sets
}

fn parse_columns(metadata: Option<&Value>) -> Result<Vec<Column>> {
    match metadata {
        Some(array @ Value::Array(_)) => Ok(serde_json::from_value(array.clone())?),
        _ => Ok(vec![Column::new(TEXT_COLUMN, "string")]),
    }
}

fn parse_rows(content: Option<&Value>) -> Vec<Vec<Value>> {
    match content {
        Some(Value::Array(rows)) => rows
            .iter()
            .map(|row| match row {
                Value::Array(cells) => cells.clone(),
                scalar => vec![scalar.clone()],
            })
            .collect(),
        Some(Value::String(text)) => text
            .lines()
            .map(|line| vec![Value::String(line.to_string())])
            .collect(),
        _ => Vec::new(),
    }
}

impl LinkisClient {
    /// Paths of the result sets stored under `location`, in index order.
    ///
    /// A location the gateway does not know has no result sets.
    pub fn list_result_sets(&self, location: &str) -> Result<Vec<(usize, String)>> {
        let request = ApiRequest::get("/filesystem/getDirFileTrees").query("path", location);
        match self.call("getDirFileTrees", &request) {
            Ok(data) => Ok(parse_listing(&data)),
            Err(LinkisError::NotFound(what)) => {
                tracing::debug!(%location, %what, "result location does not exist");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Read result set `index` under `location`, following its pages.
    ///
    /// Returns `Ok(None)` when the gateway has no such result set.
    pub fn fetch_result_set(&self, location: &str, index: usize) -> Result<Option<ResultSet>> {
        self.read_result_file(result_set_path(location, index), index)
    }

    fn read_result_file(&self, path: String, index: usize) -> Result<Option<ResultSet>> {
        let page_size = self.config().result_page_size.max(1);
        let mut columns = Vec::new();
        let mut rows = Vec::new();
        let mut page = 1u32;

        loop {
            let request = ApiRequest::get("/filesystem/openFile")
                .query("path", &path)
                .query("page", page)
                .query("pageSize", page_size);
            let data = match self.call("openFile", &request) {
                Ok(data) => data,
                Err(LinkisError::NotFound(_)) if page == 1 => return Ok(None),
                Err(e) => return Err(e),
            };

            if page == 1 {
                columns = parse_columns(data.get("metadata"))?;
            }
            let batch = parse_rows(data.get("fileContent"));
            let fetched = batch.len();
            rows.extend(batch);

            let total = data.get("totalLine").and_then(Value::as_u64);
            let complete = total.is_some_and(|t| rows.len() as u64 >= t);
            if fetched < page_size as usize || complete {
                break;
            }
            page += 1;
        }

        tracing::debug!(%path, rows = rows.len(), pages = page, "fetched result set");
        Ok(Some(ResultSet {
            index,
            path,
            columns,
            rows,
        }))
    }

    /// Read every result set of a succeeded job into one table.
    ///
    /// Rows keep result-set order, then in-set order. A job without result
    /// sets yields an empty table with no schema.
    ///
    /// # Errors
    /// `InvalidState` unless `task.status == Succeed`; `SchemaMismatch` when
    /// a later result set's columns differ from the first one's.
    pub fn fetch_results(&self, task: &Task) -> Result<ResultTable> {
        if task.status != TaskStatus::Succeed {
            return Err(LinkisError::InvalidState {
                operation: "fetch results",
                status: task.status,
            });
        }

        let mut table = ResultTable::empty();
        let Some(location) = task.result_location.as_deref() else {
            tracing::debug!(task_id = %task.task_id, "job produced no result location");
            return Ok(table);
        };

        let listing = self.list_result_sets(location)?;
        let mut fetched = 0;
        for (index, path) in listing {
            // Listed but gone by the time it is read.
            let Some(set) = self.read_result_file(path, index)? else {
                tracing::warn!(task_id = %task.task_id, index, "result set disappeared");
                continue;
            };
            if let Some(expected) = &table.columns {
                if !same_schema(expected, &set.columns) {
                    return Err(LinkisError::SchemaMismatch {
                        index,
                        expected: expected.clone(),
                        found: set.columns,
                    });
                }
            }
            table.append(set);
            fetched += 1;
        }

        tracing::info!(
            task_id = %task.task_id,
            result_sets = fetched,
            rows = table.len(),
            "fetched results"
        );
        Ok(table)
    }
}
