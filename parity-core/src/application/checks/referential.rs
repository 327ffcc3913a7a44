// parity-core/src/application/checks/referential.rs

use crate::application::checks::{SAMPLE_LIMIT, column_u64};
use crate::application::context::RunContext;
use crate::domain::compiler::quoter::SqlQuoter;
use crate::domain::rule::ReferentialParams;
use crate::domain::verdict::{Measurement, Outcome};
use crate::error::ParityError;
use serde_json::Value;

/// Orphans are child rows with a non-null key and no parent. Null keys are
/// "no reference", never an orphan. Unused parents are reported but never fail.
pub(super) async fn measure(
    ctx: &RunContext,
    p: &ReferentialParams,
) -> Result<Measurement, ParityError> {
    let session = ctx.connect(&p.child.store).await?;
    let child = SqlQuoter::ident(&p.child.table);
    let parent = SqlQuoter::ident(&p.parent.table);
    let fk = SqlQuoter::ident(&p.column);
    let pk = SqlQuoter::ident(&p.parent_column);

    let orphan_filter = format!(
        "c.{fk} IS NOT NULL AND NOT EXISTS (SELECT 1 FROM {parent} p WHERE p.{pk} = c.{fk})",
        fk = fk,
        pk = pk,
        parent = parent
    );

    let rows = session
        .rows(&format!(
            "SELECT \
               (SELECT COUNT(*) FROM {child}) AS total_rows, \
               (SELECT COUNT(*) FROM {child} c WHERE c.{fk} IS NULL) AS null_fk_rows, \
               (SELECT COUNT(*) FROM {child} c WHERE {orphans}) AS orphan_count, \
               (SELECT COUNT(*) FROM {parent} p WHERE NOT EXISTS \
                  (SELECT 1 FROM {child} c WHERE c.{fk} = p.{pk})) AS unused_parents",
            child = child,
            parent = parent,
            fk = fk,
            pk = pk,
            orphans = orphan_filter
        ))
        .await?;
    let first = rows.first();
    let total = column_u64(&session, first, "total_rows")?;
    let null_fk = column_u64(&session, first, "null_fk_rows")?;
    let orphans = column_u64(&session, first, "orphan_count")?;
    let unused_parents = column_u64(&session, first, "unused_parents")?;

    if total == 0 {
        return Ok(Measurement::empty(p.child.table.clone(), Some(p.column.clone()))
            .with_detail("unused_parent_count", unused_parents));
    }

    let mut m = Measurement::new(
        p.child.table.clone(),
        Some(p.column.clone()),
        total,
        orphans,
        Outcome::pass_if(orphans == 0),
    )
    .with_detail("parent_table", p.parent.to_string())
    .with_detail("parent_column", p.parent_column.clone())
    .with_detail("null_fk_rows", null_fk)
    .with_detail("unused_parent_count", unused_parents);

    if orphans > 0 {
        let samples = session
            .rows(&format!(
                "SELECT DISTINCT c.{fk} AS orphan_key FROM {child} c WHERE {orphans} ORDER BY 1 LIMIT {n}",
                fk = fk,
                child = child,
                orphans = orphan_filter,
                n = SAMPLE_LIMIT
            ))
            .await?;
        let keys: Vec<Value> = samples
            .into_iter()
            .filter_map(|mut r| r.remove("orphan_key"))
            .collect();
        m = m.with_detail("sample_orphan_keys", keys);
    }

    Ok(m)
}
