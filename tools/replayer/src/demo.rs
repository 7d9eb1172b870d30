//! The temperature-log demo behind the `replayer` binary: one pass finds the
//! maximum, a second pass counts the rows carrying it, and a third splits the
//! drained buffer across threads.

use crate::config::InputConfig;
use crate::errors::{ReplayError, SourceError};
use crate::replay::recording::RecorderStats;
use crate::replay::replayer::{SequenceFactory, SequenceView};
use crate::source::{LineSource, SourceCursor};
use serde::Serialize;
use std::io::BufRead;

/// Integer values of one delimited column, skipping blank lines, comment
/// lines and a configurable number of leading data rows.
pub struct ColumnSource<R> {
    lines: LineSource<R>,
    comment_prefix: String,
    skip_rows: usize,
    column: usize,
    delimiter: char,
    line_no: usize,
    data_rows: usize,
}

impl<R: BufRead> ColumnSource<R> {
    pub fn new(reader: R, input: &InputConfig) -> Self {
        Self {
            lines: LineSource::new(reader),
            comment_prefix: input.comment_prefix.clone(),
            skip_rows: input.skip_rows,
            column: input.column,
            delimiter: input.delimiter,
            line_no: 0,
            data_rows: 0,
        }
    }
}

impl<R> SourceCursor for ColumnSource<R>
where
    R: BufRead + Send,
{
    type Item = i64;

    fn pull_next(&mut self) -> Result<Option<i64>, SourceError> {
        loop {
            let Some(line) = self.lines.pull_next()? else {
                return Ok(None);
            };
            self.line_no += 1;
            let row = line.trim();
            if row.is_empty() || row.starts_with(self.comment_prefix.as_str()) {
                continue;
            }
            self.data_rows += 1;
            if self.data_rows <= self.skip_rows {
                continue;
            }

            let line_no = self.line_no;
            let field = row.split(self.delimiter).nth(self.column).ok_or_else(|| {
                ReplayError::Parse(format!("line {line_no}: no column {}", self.column))
            })?;
            let value = field
                .trim()
                .parse::<i64>()
                .map_err(|e| ReplayError::Parse(format!("line {line_no}: {field:?}: {e}")))?;
            return Ok(Some(value));
        }
    }

    fn release(&mut self) {
        self.lines.release();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoSummary {
    pub rows: usize,
    pub max: Option<i64>,
    pub max_count: usize,
    pub parallel_max: Option<i64>,
    pub splits: usize,
    pub stats: RecorderStats,
}

/// Closes the factory on drop, so early returns and panics release the
/// source too.
struct CloseOnDrop<'a, S: SourceCursor>(&'a SequenceFactory<S>);

impl<S: SourceCursor> Drop for CloseOnDrop<'_, S> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Runs the three traversals and closes the factory, whether or not they
/// succeed.
pub fn run_demo<S>(factory: &SequenceFactory<S>, threads: usize) -> Result<DemoSummary, ReplayError>
where
    S: SourceCursor<Item = i64>,
{
    let closer = CloseOnDrop(factory);
    let (rows, max) = fold_max(factory.create())?;

    let mut max_count = 0;
    if let Some(max) = max {
        for value in factory.create() {
            if value? == max {
                max_count += 1;
            }
        }
    }

    let parts = split_into(factory.create(), threads.max(1));
    let splits = parts.len();
    let partials = std::thread::scope(|scope| {
        let handles = parts
            .into_iter()
            .map(|view| scope.spawn(move || fold_max(view)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
            })
            .collect::<Result<Vec<_>, ReplayError>>()
    })?;
    let parallel_max = partials.into_iter().filter_map(|(_, max)| max).max();

    drop(closer);
    Ok(DemoSummary {
        rows,
        max,
        max_count,
        parallel_max,
        splits,
        stats: factory.stats(),
    })
}

fn fold_max<S>(view: SequenceView<S>) -> Result<(usize, Option<i64>), ReplayError>
where
    S: SourceCursor<Item = i64>,
{
    let mut rows = 0;
    let mut max: Option<i64> = None;
    for value in view {
        let value = value?;
        rows += 1;
        max = Some(max.map_or(value, |current| current.max(value)));
    }
    Ok((rows, max))
}

/// Splits until `parts` views exist or no view can be split further.
fn split_into<S: SourceCursor>(view: SequenceView<S>, parts: usize) -> Vec<SequenceView<S>> {
    let mut views = vec![view];
    let mut grew = true;
    while grew && views.len() < parts {
        grew = false;
        for index in 0..views.len() {
            if views.len() >= parts {
                break;
            }
            if let Some(front) = views[index].try_split() {
                views.push(front);
                grew = true;
            }
        }
    }
    views
}
