//! 시리즈 팩트 테이블의 일괄 적재와 범위 조회.
//!
//! 캔들과 체결은 (series_id, timestamp)당 한 행만 허용합니다. 적재는 청크마다
//! UNNEST 한 문장으로 시도하고, 고유 제약 위반이 나면 그 청크만 행 단위
//! `ON CONFLICT DO NOTHING`으로 다시 넣습니다. 먼저 들어간 행이 유지됩니다.

use crate::connection::Database;
use crate::error::Result;
use crate::range::TimeRange;
use crate::series::SeriesId;
use crate::table::Table;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::{debug, instrument, warn};

/// 한 번에 적재하는 최대 행 수.
pub const CHUNK_SIZE: usize = 1000;

/// 일괄 적재 가능한 행.
pub trait IngestRow: Send + Sync + Sized {
    /// 대상 테이블 이름 (로그용).
    const TABLE: &'static str;

    /// 충돌 처리 없는 UNNEST 일괄 INSERT.
    fn bulk_insert(series_id: SeriesId, rows: &[Self]) -> Query<'static, Postgres, PgArguments>;

    /// 충돌 시 무시하는 단건 INSERT.
    fn insert_ignore(series_id: SeriesId, row: &Self) -> Query<'static, Postgres, PgArguments>;
}

/// 시리즈와 시간으로 조회 가능한 레코드.
pub trait RangeRow: Send + Unpin + for<'r> FromRow<'r, PgRow> {
    /// `WHERE` 앞까지의 SELECT 문.
    const SELECT: &'static str;
}

/// 행들을 적재하고 실제로 삽입된 행 수를 반환합니다.
#[instrument(skip(db, rows), fields(table = R::TABLE, series_id = %series_id, count = rows.len()))]
pub async fn ingest_batch<R: IngestRow>(
    db: &Database,
    series_id: SeriesId,
    rows: &[R],
) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut inserted = 0;

    for chunk in rows.chunks(CHUNK_SIZE) {
        match db.execute(R::bulk_insert(series_id, chunk)).await {
            Ok(affected) => inserted += affected as usize,
            Err(e) if e.is_conflict() => {
                warn!(chunk = chunk.len(), "Bulk insert hit existing rows, retrying row by row");
                inserted += insert_row_by_row(db, series_id, chunk).await?;
            }
            Err(e) => return Err(e),
        }
    }

    debug!(inserted, "Batch ingested");
    Ok(inserted)
}

/// 한 트랜잭션 안에서 행 단위로 삽입합니다. 충돌 행은 건너뜁니다.
async fn insert_row_by_row<R: IngestRow>(
    db: &Database,
    series_id: SeriesId,
    chunk: &[R],
) -> Result<usize> {
    let mut conn = db.acquire().await?;
    let mut tx = conn.begin().await?;
    let mut inserted = 0;

    for row in chunk {
        let result = R::insert_ignore(series_id, row).execute(&mut *tx).await?;
        inserted += result.rows_affected() as usize;
    }

    tx.commit().await?;
    Ok(inserted)
}

/// 시리즈의 범위 내 레코드를 시간 오름차순으로 조회합니다.
pub async fn load_range<R: RangeRow>(
    db: &Database,
    series_id: SeriesId,
    range: TimeRange,
) -> Result<Table<R>> {
    let mut builder = QueryBuilder::<Postgres>::new(R::SELECT);
    builder.push(" WHERE series_id = ").push_bind(series_id).push(" AND ");
    range.push_predicate(&mut builder, "timestamp");
    builder.push(" ORDER BY timestamp ASC");

    db.fetch_table(&mut builder).await
}
