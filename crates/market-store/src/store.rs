//! 저장소 진입점.
//!
//! `MarketStore`는 연결 제공자, 시리즈 해석기, 테이블별 저장소를 묶은 핸들입니다.
//! 전역 인스턴스 없이 명시적으로 생성해 전달하며, 복제본은 모든 상태를 공유합니다.
//!
//! 쓰기 경로는 시리즈를 필요하면 등록하고, 읽기 경로는 등록하지 않습니다.
//! 등록되지 않은 시리즈를 조회하면 빈 결과를 반환합니다.

use crate::connection::{ConnectionMode, Database};
use crate::error::{DataError, Result};
use crate::range::TimeRange;
use crate::series::{SeriesId, SeriesResolver};
use crate::storage::{
    ingest_batch, ArbitrageDeltaRecord, ArbitrageRepository, ArbitrageStats, CandleRecord,
    CandleRepository, ClusterRecord, ClusterRepository, IngestRow, LevelRecord, LevelRepository,
    Selector, StatusUpdate, SymbolStatusRecord, SymbolStatusRepository, TradeRecord,
    TradeRepository,
};
use crate::table::Table;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use market_core::{
    series_span, ArbitrageDelta, Candle, ClusterBucket, LevelType, SeriesKey, StoreConfig,
    Timeframe, Trade,
};
use rust_decimal::Decimal;
use tracing::{info, Instrument};

/// 시간 범위 조회 대상 팩트 테이블.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKind {
    Candles,
    Trades,
}

/// `load_range` 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum FactTable {
    Candles(Table<CandleRecord>),
    Trades(Table<TradeRecord>),
}

impl FactTable {
    fn empty(kind: FactKind) -> Self {
        match kind {
            FactKind::Candles => FactTable::Candles(Table::empty()),
            FactKind::Trades => FactTable::Trades(Table::empty()),
        }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            FactTable::Candles(table) => table.columns(),
            FactTable::Trades(table) => table.columns(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FactTable::Candles(table) => table.len(),
            FactTable::Trades(table) => table.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 시장 데이터 저장소 핸들.
#[derive(Clone)]
pub struct MarketStore {
    db: Database,
    series: SeriesResolver,
    candles: CandleRepository,
    trades: TradeRepository,
    clusters: ClusterRepository,
    levels: LevelRepository,
    arbitrage: ArbitrageRepository,
    status: SymbolStatusRepository,
}

impl MarketStore {
    /// 설정에 따라 연결하고, 필요하면 마이그레이션을 실행한 뒤 시리즈 캐시를 적재합니다.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let db = Database::connect(config).await?;
        if config.run_migrations {
            db.migrate().await?;
        }

        let store = Self::new(db);
        let series = store.init().await?;
        info!(mode = %store.mode(), series, "Market store ready");
        Ok(store)
    }

    /// 연결된 데이터베이스로 생성합니다. 캐시 적재는 `init()`에서 합니다.
    pub fn new(db: Database) -> Self {
        Self {
            series: SeriesResolver::postgres(db.clone()),
            candles: CandleRepository::new(db.clone()),
            trades: TradeRepository::new(db.clone()),
            clusters: ClusterRepository::new(db.clone()),
            levels: LevelRepository::new(db.clone()),
            arbitrage: ArbitrageRepository::new(db.clone()),
            status: SymbolStatusRepository::new(db.clone()),
            db,
        }
    }

    /// 시리즈 캐시를 적재합니다. 여러 번 호출해도 안전합니다.
    pub async fn init(&self) -> Result<usize> {
        self.series.init().await
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn series(&self) -> &SeriesResolver {
        &self.series
    }

    pub fn mode(&self) -> ConnectionMode {
        self.db.mode()
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.db.health_check().await
    }

    // ==================== 시리즈 ====================

    /// 시리즈 ID를 반환하며, 없으면 등록합니다.
    pub async fn resolve(&self, key: &SeriesKey) -> Result<SeriesId> {
        self.series.resolve(key).await
    }

    /// 일봉 시리즈 ID를 반환하며, 없으면 등록합니다.
    pub async fn resolve_default_timeframe(&self, symbol: &str) -> Result<SeriesId> {
        self.series.resolve_default_timeframe(symbol).await
    }

    // ==================== 쓰기 ====================

    /// 캔들 또는 체결을 일괄 저장하고 실제 삽입 수를 반환합니다.
    pub async fn ingest_batch<R: IngestRow>(&self, series_id: SeriesId, rows: &[R]) -> Result<usize> {
        ingest_batch(&self.db, series_id, rows).await
    }

    /// 시리즈를 해석한 뒤 캔들을 저장합니다.
    pub async fn save_candles(&self, key: &SeriesKey, candles: &[Candle]) -> Result<usize> {
        let series_id = self.resolve(key).await?;
        self.candles
            .insert_batch(series_id, candles)
            .instrument(series_span!("save_candles", key, series_id))
            .await
    }

    /// 시리즈를 해석한 뒤 체결을 저장합니다.
    pub async fn save_trades(&self, key: &SeriesKey, trades: &[Trade]) -> Result<usize> {
        let series_id = self.resolve(key).await?;
        self.trades
            .insert_batch(series_id, trades)
            .instrument(series_span!("save_trades", key, series_id))
            .await
    }

    /// 일봉 시리즈에 체결 하나를 저장합니다. 같은 시각이 이미 있으면 false.
    pub async fn add_trade(&self, symbol: &str, trade: &Trade) -> Result<bool> {
        let series_id = self.resolve_default_timeframe(symbol).await?;
        self.trades.insert(series_id, trade).await
    }

    /// 클러스터 프로파일을 저장합니다.
    pub async fn save_clusters(
        &self,
        key: &SeriesKey,
        timestamp: DateTime<Utc>,
        step: Decimal,
        buckets: &[ClusterBucket],
    ) -> Result<usize> {
        let series_id = self.resolve(key).await?;
        self.clusters
            .insert_profile(series_id, timestamp, step, buckets)
            .await
    }

    /// 현재 레벨을 원자적으로 교체합니다.
    pub async fn replace_level(
        &self,
        series_id: SeriesId,
        level_type: LevelType,
        value: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.levels
            .replace(series_id, level_type, value, timestamp)
            .await
    }

    /// 한 시점의 심볼별 차익 델타를 저장합니다. 심볼은 일봉 시리즈로 해석됩니다.
    pub async fn save_arbitrage_deltas<S>(
        &self,
        timestamp: DateTime<Utc>,
        deltas: &[(S, ArbitrageDelta)],
    ) -> Result<usize>
    where
        S: AsRef<str> + Sync,
    {
        let rows = try_join_all(deltas.iter().map(|(symbol, delta)| async move {
            let series_id = self.resolve_default_timeframe(symbol.as_ref()).await?;
            Ok::<_, DataError>((series_id, delta.clone()))
        }))
        .await?;
        self.arbitrage.insert_batch(timestamp, &rows).await
    }

    // ==================== 읽기 ====================

    /// 범위 내 캔들 또는 체결을 시간순으로 조회합니다.
    pub async fn load_range(
        &self,
        kind: FactKind,
        key: &SeriesKey,
        range: TimeRange,
    ) -> Result<FactTable> {
        let Some(series_id) = self.series.lookup(key).await? else {
            return Ok(FactTable::empty(kind));
        };

        match kind {
            FactKind::Candles => Ok(FactTable::Candles(
                self.candles.load_range(series_id, range).await?,
            )),
            FactKind::Trades => Ok(FactTable::Trades(
                self.trades.load_range(series_id, range).await?,
            )),
        }
    }

    pub async fn load_candles(
        &self,
        key: &SeriesKey,
        range: TimeRange,
    ) -> Result<Table<CandleRecord>> {
        match self.series.lookup(key).await? {
            Some(series_id) => self.candles.load_range(series_id, range).await,
            None => Ok(Table::empty()),
        }
    }

    pub async fn load_trades(&self, key: &SeriesKey, range: TimeRange) -> Result<Table<TradeRecord>> {
        match self.series.lookup(key).await? {
            Some(series_id) => self.trades.load_range(series_id, range).await,
            None => Ok(Table::empty()),
        }
    }

    /// 가장 최근 캔들 시각.
    pub async fn last_candle_timestamp(&self, key: &SeriesKey) -> Result<Option<DateTime<Utc>>> {
        match self.series.lookup(key).await? {
            Some(series_id) => self.candles.last_timestamp(series_id).await,
            None => Ok(None),
        }
    }

    /// 범위 내 클러스터 행.
    pub async fn load_clusters(
        &self,
        key: &SeriesKey,
        range: TimeRange,
    ) -> Result<Table<ClusterRecord>> {
        match self.series.lookup(key).await? {
            Some(series_id) => self.clusters.load_range(series_id, range).await,
            None => Ok(Table::empty()),
        }
    }

    /// 기본 클러스터 타임프레임(15분)의 클러스터 행.
    pub async fn load_default_clusters(
        &self,
        symbol: &str,
        range: TimeRange,
    ) -> Result<Table<ClusterRecord>> {
        self.load_clusters(&SeriesKey::new(symbol, Timeframe::CLUSTER_DEFAULT), range)
            .await
    }

    /// 심볼/타임프레임 필터로 현재 레벨을 조회합니다.
    pub async fn load_levels(
        &self,
        symbols: Selector<String>,
        timeframes: Selector<Timeframe>,
        level_type: Option<LevelType>,
    ) -> Result<Table<LevelRecord>> {
        self.levels.load(symbols, timeframes, level_type).await
    }

    /// 범위 내 심볼별 델타 통계.
    pub async fn load_stats(&self, range: TimeRange) -> Result<Table<ArbitrageStats>> {
        self.arbitrage.stats(range).await
    }

    /// 심볼별 가장 최근 델타.
    pub async fn load_latest(&self, range: TimeRange) -> Result<Table<ArbitrageDeltaRecord>> {
        self.arbitrage.latest(range).await
    }

    /// 범위 내 델타. `symbol`이 없으면 모든 심볼입니다.
    pub async fn load_arbitrage_deltas(
        &self,
        symbol: Option<&str>,
        range: TimeRange,
    ) -> Result<Table<ArbitrageDeltaRecord>> {
        self.arbitrage.load(symbol, range).await
    }

    // ==================== 심볼 상태 ====================

    pub async fn upsert_symbol_status(
        &self,
        symbol: &str,
        last_sync: Option<DateTime<Utc>>,
        last_volume: Option<Decimal>,
        active: bool,
    ) -> Result<()> {
        let series_id = self.resolve_default_timeframe(symbol).await?;
        self.status
            .upsert(series_id, last_sync, last_volume, active)
            .await
    }

    /// 상태 컬럼 하나를 갱신합니다. 상태 행이 없으면 false.
    pub async fn update_symbol_status(&self, symbol: &str, update: StatusUpdate) -> Result<bool> {
        let series_id = self.resolve_default_timeframe(symbol).await?;
        self.status.update(series_id, update).await
    }

    pub async fn load_symbol_status(&self, symbol: &str) -> Result<Option<SymbolStatusRecord>> {
        match self.series.lookup(&SeriesKey::daily(symbol)).await? {
            Some(series_id) => self.status.get(series_id).await,
            None => Ok(None),
        }
    }

    pub async fn list_symbol_status(&self, active: bool) -> Result<Vec<SymbolStatusRecord>> {
        self.status.list(active).await
    }
}
