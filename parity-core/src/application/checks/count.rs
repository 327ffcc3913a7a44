// parity-core/src/application/checks/count.rs

use tracing::info;

use crate::application::chunked::{CountResult, count_rows};
use crate::application::context::RunContext;
use crate::domain::compliance::tolerance::count_within_tolerance;
use crate::domain::rule::{CountParams, TableRef};
use crate::domain::verdict::{Measurement, Outcome};
use crate::error::ParityError;

async fn count_side(
    ctx: &RunContext,
    table: &TableRef,
    custom_query: Option<&str>,
    p: &CountParams,
) -> Result<CountResult, ParityError> {
    // One session per side, released before the other side is checked out,
    // so a single-connection pool cannot deadlock on same-store rules.
    let session = ctx.connect(&table.store).await?;
    match custom_query {
        Some(query) => Ok(CountResult {
            count: session.count(query).await?,
            chunks: 0,
        }),
        None => {
            count_rows(
                &session,
                &table.table,
                &p.id_column,
                p.where_clause.as_deref(),
                &ctx.chunking(),
            )
            .await
        }
    }
}

pub(super) async fn measure(ctx: &RunContext, p: &CountParams) -> Result<Measurement, ParityError> {
    let source = count_side(ctx, &p.source, p.source_query.as_deref(), p).await?;
    let target = count_side(ctx, &p.target, p.target_query.as_deref(), p).await?;

    let difference = source.count.abs_diff(target.count);
    info!(
        source = source.count,
        target = target.count,
        difference,
        "Row counts measured"
    );

    let base = if source.count == 0 {
        // Empty source never passes silently, whatever the target holds.
        Measurement::empty(p.target.table.clone(), None)
    } else {
        let outcome = Outcome::pass_if(count_within_tolerance(
            source.count,
            target.count,
            p.tolerance,
        ));
        Measurement::new(p.target.table.clone(), None, source.count, difference, outcome)
    };

    Ok(base
        .with_detail("source_table", p.source.to_string())
        .with_detail("target_table", p.target.to_string())
        .with_detail("source_count", source.count)
        .with_detail("target_count", target.count)
        .with_detail("difference", difference)
        .with_detail("tolerance", p.tolerance)
        .with_detail("source_chunks", source.chunks)
        .with_detail("target_chunks", target.chunks))
}
