//! Order Executor: consumes one account's signal queue and turns each
//! signal into a broker order, a position_stop row, and a notification.
//!
//! Runs as its own OS process per account, so unlike the signal-generator
//! it owns no cooperative-task fan-in — a single consume loop, one signal
//! at a time, wrapped in a wall-clock timeout so a wedged broker call
//! can't stall the account's entire queue indefinitely.

use std::time::Duration as StdDuration;

use chrono::{NaiveDate, Utc};
use meridian_core::{
    AccountState, Error, ExecutionStatus, PositionStatus, PositionStop, Result, Side, Signal, SignalType, Symbol,
};
use meridian_engine::budget::{compute_budget, round_to_lot, target_currency, CurrencyAvailability};
use meridian_engine::kelly::{kelly_budget, qualifying_tier, KellyParams};
use meridian_engine::regime::CachedRegime;
use meridian_engine::{classify_regime, select_smart_rotation_candidate, IndexVote, Regime, RotationCandidate, ROTATION_GAP_THRESHOLD};
use meridian_indicators::{compute_with_previous, HybridKlineLoader, Indicator, Kline, KlineApiSource, KlineDbSource, Sma};
use meridian_networking::{Broker, CandlePeriod, Notifier, OrderType, Severity, SubmitOrderRequest};
use meridian_persistence::db::position_stops::ClosedTradeStats;
use meridian_persistence::db::{calendar, orders, position_stops, signal_history, PgKlineStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::context::AppContext;

const DISPATCH_TIMEOUT: StdDuration = StdDuration::from_secs(60);
const ZOMBIE_TIMEOUT_SECONDS: i64 = 120;

struct OeState {
    regime_cache: Option<CachedRegime>,
}

impl OeState {
    fn new() -> Self {
        Self { regime_cache: None }
    }
}

/// What happened to a dequeued signal, decided by `dispatch` and acted on
/// by the consume loop's single queue-bookkeeping call.
enum Disposition {
    /// Broker accepted the order (or the signal was a no-op skip that
    /// still needs to leave `processing`): remove it outright.
    Done,
    /// Already dealt with by the handler itself (e.g. a queue integrity
    /// error left in place for zombie recovery): no further bookkeeping.
    Handled,
    /// Budget or broker estimate came back zero: walks the dedicated
    /// funds retry band (`FUNDS_RETRY_MAX`/`FUNDS_RETRY_DELAY`), distinct
    /// from the general transient-error backoff ladder.
    RetryFunds(Error),
    /// Transient broker/network trouble: requeue through the normal
    /// backoff ladder.
    Retry(Error),
    /// Non-retryable: move to the failed keyspace and notify.
    Fail(Error),
}

struct BrokerKlineSource<'a> {
    broker: &'a dyn Broker,
}

#[async_trait::async_trait]
impl<'a> KlineApiSource for BrokerKlineSource<'a> {
    async fn fetch_latest_days(&self, symbol: &str, days: i64) -> Result<Vec<Kline>> {
        self.fetch(symbol, days).await
    }

    async fn fetch_days(&self, symbol: &str, days: i64) -> Result<Vec<Kline>> {
        self.fetch(symbol, days).await
    }
}

impl<'a> BrokerKlineSource<'a> {
    async fn fetch(&self, symbol: &str, days: i64) -> Result<Vec<Kline>> {
        let bars = self.broker.get_candlesticks(symbol, CandlePeriod::Day, days.max(1) as usize).await?;
        Ok(bars
            .into_iter()
            .map(|b| Kline { date: b.timestamp.date_naive(), open: b.open, high: b.high, low: b.low, close: b.close, volume: b.volume })
            .collect())
    }
}

fn beijing_today() -> NaiveDate {
    Utc::now().with_timezone(&chrono_tz::Asia::Shanghai).date_naive()
}

async fn load_klines(ctx: &AppContext, symbol: &str, today: NaiveDate) -> Result<Option<Vec<Kline>>> {
    let api = BrokerKlineSource { broker: ctx.broker.as_ref() };
    let db_store = PgKlineStore::new(&ctx.db);
    let db_ref: Option<&dyn KlineDbSource> = if ctx.config.use_db_klines { Some(&db_store) } else { None };
    let loader = HybridKlineLoader {
        db: db_ref,
        api: &api,
        history_days: ctx.config.db_klines_history_days,
        api_latest_days: ctx.config.api_klines_latest_days,
    };
    match loader.load(symbol, today).await {
        Ok(rows) => Ok(rows),
        Err(Error::DataShortage { symbol, rows }) => {
            debug!(symbol, rows, "data shortage, skipping rotation candidate");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn index_vote(ctx: &AppContext, symbol: &str, inverse_symbols: &[String], today: NaiveDate) -> Result<Option<IndexVote>> {
    let Some(klines) = load_klines(ctx, symbol, today).await? else { return Ok(None) };
    let mut sma200 = Sma::new(200);
    sma200.update_batch(&klines)?;
    let Some(ma200) = sma200.value().and_then(|v| v.value.single()) else { return Ok(None) };
    let close = klines.last().map(|k| k.close).unwrap_or_default();
    let inverse = inverse_symbols.iter().any(|s| s == symbol);
    Ok(Some(IndexVote { inverse, close, ma200 }))
}

/// OE keeps its own 10-minute regime cache rather than sharing SG's —
/// the two binaries are independent processes with no shared memory,
/// each needing the regime for its own sizing decisions.
async fn current_regime(ctx: &AppContext, state: &mut OeState) -> Result<Regime> {
    let now = Utc::now();
    if let Some(cached) = &state.regime_cache {
        if !cached.is_stale(now) {
            return Ok(cached.regime());
        }
    }

    let hk_active = calendar::is_market_open(ctx.db.pool(), meridian_core::Market::Hk, now).await.unwrap_or(false);
    let us_active = calendar::is_market_open(ctx.db.pool(), meridian_core::Market::Us, now).await.unwrap_or(false);
    let (hk_symbols, us_symbols): (Vec<String>, Vec<String>) =
        ctx.config.regime_index_symbols.iter().cloned().partition(|s| s.ends_with(".HK"));
    let symbols = meridian_engine::regime::active_index_symbols(hk_active, us_active, &hk_symbols, &us_symbols);

    let today = beijing_today();
    let mut votes = Vec::new();
    for symbol in symbols {
        if let Ok(Some(vote)) = index_vote(ctx, symbol, &ctx.config.regime_inverse_symbols, today).await {
            votes.push(vote);
        }
    }

    let regime = classify_regime(&votes);
    state.regime_cache = Some(CachedRegime::new(regime, now, 10));
    Ok(regime)
}

async fn refresh_account(ctx: &AppContext) -> Result<AccountState> {
    match ctx.broker.get_account().await {
        Ok(state) => {
            ctx.cache.insert(&ctx.config.account_id, state.clone());
            Ok(state)
        }
        Err(e) => {
            warn!("account refresh failed, degrading to stale cache: {e}");
            ctx.cache.get_stale(&ctx.config.account_id).ok_or(e)
        }
    }
}

async fn account_state(ctx: &AppContext) -> Result<AccountState> {
    if let Some(state) = ctx.cache.get(&ctx.config.account_id) {
        return Ok(state);
    }
    refresh_account(ctx).await
}

/// Runs the order-executor consume loop until `shutdown` fires.
pub async fn run(ctx: AppContext, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
    ctx.queue.recover_zombie_signals(&ctx.config.account_id, ZOMBIE_TIMEOUT_SECONDS).await.ok();

    let mut state = OeState::new();
    info!(account = %ctx.config.account_id, "order-executor started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("shutdown requested, draining in-flight signal before exit");
                break;
            }
            signal = ctx.queue.consume(&ctx.config.account_id, ZOMBIE_TIMEOUT_SECONDS) => {
                match signal {
                    Ok(Some(signal)) => {
                        let disposition = match tokio::time::timeout(DISPATCH_TIMEOUT, dispatch(&ctx, &mut state, &signal)).await {
                            Ok(d) => d,
                            Err(_) => Disposition::Retry(Error::TransientBrokerError("dispatch timed out after 60s".to_string())),
                        };
                        apply_disposition(&ctx, &signal, disposition).await;
                    }
                    Ok(None) => {
                        tokio::time::sleep(StdDuration::from_millis(500)).await;
                    }
                    Err(e) => {
                        warn!("queue consume failed: {e}");
                        tokio::time::sleep(StdDuration::from_secs(1)).await;
                    }
                }
            }
        }
    }

    Ok(())
}

async fn apply_disposition(ctx: &AppContext, signal: &Signal, disposition: Disposition) {
    let account = &ctx.config.account_id;
    let outcome = match disposition {
        Disposition::Done => ctx.queue.mark_completed(account, signal).await,
        Disposition::Handled => Ok(()),
        Disposition::RetryFunds(e) => {
            if signal.funds_retry_count < ctx.config.funds_retry_max {
                debug!(symbol = %signal.symbol, funds_retry_count = signal.funds_retry_count, "insufficient funds, parking in funds retry band: {e}");
                let result = ctx.queue.mark_completed(account, signal).await;
                if result.is_ok() {
                    let mut next = signal.clone();
                    next._original_json = None;
                    ctx.queue.requeue_funds_retry(account, &mut next, ctx.config.funds_retry_delay_minutes as i64).await
                } else {
                    result
                }
            } else {
                warn!(symbol = %signal.symbol, "funds retry band exhausted, failing permanently: {e}");
                let result = ctx.queue.mark_failed(account, signal, &e, false).await;
                ctx.notifier
                    .notify("insufficient_funds", &signal.symbol, Severity::Warning, &format!("{} on {}: {e}", signal.signal_type.as_str(), signal.symbol))
                    .await;
                result
            }
        }
        Disposition::Retry(e) => {
            warn!(symbol = %signal.symbol, "signal failed transiently, will retry: {e}");
            ctx.queue.mark_failed(account, signal, &e, true).await
        }
        Disposition::Fail(e) => {
            warn!(symbol = %signal.symbol, "signal failed permanently: {e}");
            let result = ctx.queue.mark_failed(account, signal, &e, false).await;
            ctx.notifier
                .notify("order_failed", &signal.symbol, Severity::Critical, &format!("{} on {}: {e}", signal.signal_type.as_str(), signal.symbol))
                .await;
            result
        }
    };
    if let Err(e) = outcome {
        warn!(symbol = %signal.symbol, "failed to update queue bookkeeping: {e}");
    }
}

/// Classifies a signal and carries out the corresponding broker/DB work.
/// Any error surfaced here that isn't specially handled in-line is mapped
/// to a retry/fail disposition by the caller.
async fn dispatch(ctx: &AppContext, state: &mut OeState, signal: &Signal) -> Disposition {
    match run_dispatch(ctx, state, signal).await {
        Ok(disposition) => disposition,
        Err(e) => {
            if matches!(e, Error::RateLimitError(_)) {
                // Independent of the retry/backoff path: push the account
                // cache's TTL out so the next refresh doesn't immediately
                // hammer the broker again while it's rate-limiting us.
                if let Some(account) = ctx.cache.get_stale(&ctx.config.account_id) {
                    ctx.cache.insert_after_rate_limit(&ctx.config.account_id, account);
                }
            }
            classify_error(e)
        }
    }
}

fn classify_error(e: Error) -> Disposition {
    match e {
        Error::QueueIntegrityError(_) => {
            warn!("queue integrity error, leaving signal in processing for zombie recovery: {e}");
            Disposition::Handled
        }
        Error::InsufficientFunds { .. } => Disposition::RetryFunds(e),
        Error::InvalidSymbol(_) => Disposition::Fail(e),
        _ if e.retryable() => Disposition::Retry(e),
        _ => Disposition::Fail(e),
    }
}

async fn run_dispatch(ctx: &AppContext, state: &mut OeState, signal: &Signal) -> Result<Disposition> {
    let account = account_state(ctx).await?;

    if signal.signal_type.is_buy_family() {
        handle_buy(ctx, state, &account, signal).await
    } else {
        handle_sell(ctx, &account, signal).await
    }
}

async fn handle_buy(ctx: &AppContext, state: &mut OeState, account: &AccountState, signal: &Signal) -> Result<Disposition> {
    if signal.signal_type == SignalType::WeakBuy && signal.score < 35 {
        debug!(symbol = %signal.symbol, score = signal.score, "WEAK_BUY below hard score floor, skipping");
        return Ok(Disposition::Done);
    }

    if ctx.queue.has_pending_side(&ctx.config.account_id, &signal.symbol, Side::Sell, true).await.unwrap_or(false) {
        debug!(symbol = %signal.symbol, "opposite-direction signal pending, deferring buy");
        return Ok(Disposition::Retry(Error::TransientBrokerError("opposite-direction sell pending".to_string())));
    }

    let parsed: Symbol = signal.symbol.parse()?;
    let currency = target_currency(parsed.market);
    let lot_size = ctx.broker.lot_size(&signal.symbol).await.unwrap_or(if parsed.market == meridian_core::Market::Us { 1 } else { 100 }).max(1);

    let balance = account.balances.get(currency).cloned().unwrap_or_default();
    let regime = current_regime(ctx, state).await?;
    let kelly = kelly_sized_budget(ctx, signal, balance.net_assets).await;

    let availability = CurrencyAvailability { buy_power: balance.buy_power, cash: balance.cash, remaining_finance: balance.remaining_finance };
    let budget = compute_budget(signal.score, balance.net_assets, regime, kelly, availability);

    if budget <= Decimal::ZERO {
        ctx.notifier
            .notify("no_buying_power", &signal.symbol, Severity::Warning, &format!("{} budget computed to zero, no funds available", signal.symbol))
            .await;
        return Ok(Disposition::Done);
    }

    let estimate = ctx
        .broker
        .estimate_max_purchase_quantity(&signal.symbol, OrderType::Limit, Side::Buy, signal.price, currency)
        .await
        .ok();
    let mut api_max = estimate.as_ref().map(|e| e.margin_max_qty.max(e.cash_max_qty)).unwrap_or(0);

    if api_max == 0 {
        // Cash fallback: half of available cash, but only if it clears
        // 1.5 lots — otherwise the fallback itself would round to nothing.
        let fallback_shares = (balance.cash * dec!(0.5) / signal.price).floor();
        let min_viable = Decimal::from(lot_size) * dec!(1.5);
        if fallback_shares >= min_viable {
            api_max = fallback_shares.to_string().parse::<i64>().unwrap_or(0);
        }
    }

    if api_max == 0 {
        return Err(Error::InsufficientFunds { required: budget.to_string(), available: availability.available().to_string() });
    }

    let budget_qty = round_to_lot(budget, signal.price, lot_size);
    let qty = budget_qty.min(api_max);

    if qty < lot_size {
        if let Some(outcome) = attempt_buy_time_rotation(ctx, account, signal, regime, parsed.market).await? {
            info!(symbol = %signal.symbol, victim = %outcome, "triggered smart rotation to free capital for buy");
        } else {
            debug!(symbol = %signal.symbol, score = signal.score, "sub-lot budget, no rotation candidate cleared the gap");
            return Ok(Disposition::Done);
        }
        return Err(Error::InsufficientFunds { required: budget.to_string(), available: availability.available().to_string() });
    }

    let buy_price = signal.price * dec!(1.001);
    let result = ctx.broker.submit_order(SubmitOrderRequest::limit_day(&signal.symbol, Side::Buy, qty, buy_price)).await?;

    let order = meridian_core::OrderRecord {
        order_id: result.order_id.clone(),
        account_id: ctx.config.account_id.clone(),
        symbol: signal.symbol.clone(),
        side: Side::Buy,
        price: buy_price,
        quantity: qty,
        status: result.status,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    orders::insert_order(ctx.db.pool(), &order).await?;

    let (stop_loss, take_profit) = match (signal.stop_loss, signal.take_profit) {
        (Some(sl), Some(tp)) => (sl, tp),
        _ => {
            let atr = signal.indicators.atr.unwrap_or(signal.price * dec!(0.02));
            (signal.price - atr * dec!(2.5), signal.price + atr * dec!(3.5))
        }
    };
    let stop = PositionStop::from_atr(ctx.config.account_id.clone(), signal.symbol.clone(), buy_price, atr_or_default(signal), strategy_name(signal.signal_type), Utc::now());
    let stop = PositionStop { stop_loss, take_profit, ..stop };
    position_stops::insert_position_stop(ctx.db.pool(), &stop).await?;

    if let Ok(Some(id)) = signal_history::find_pending_id(ctx.db.pool(), &ctx.config.account_id, &signal.symbol, signal.timestamp).await {
        signal_history::record_execution(ctx.db.pool(), id, ExecutionStatus::Executed, Utc::now(), Some(buy_price), Some(qty), Some(&result.order_id), None).await.ok();
    }

    ctx.cache.invalidate(&ctx.config.account_id);
    ctx.queue.wake_up_delayed(&ctx.config.account_id).await.ok();
    ctx.notifier
        .notify("order_filled", &signal.symbol, Severity::Info, &format!("BUY {qty} {} @ {buy_price}", signal.symbol))
        .await;

    Ok(Disposition::Done)
}

fn atr_or_default(signal: &Signal) -> Decimal {
    signal.indicators.atr.unwrap_or(signal.price * dec!(0.02))
}

fn strategy_name(signal_type: SignalType) -> String {
    signal_type.as_str().to_string()
}

async fn kelly_sized_budget(ctx: &AppContext, signal: &Signal, net_assets: Decimal) -> Option<Decimal> {
    if !ctx.config.kelly_enabled {
        return None;
    }
    let since = Utc::now() - chrono::Duration::days(30);
    let parsed: Symbol = signal.symbol.parse().ok()?;
    let market_suffix = format!(".{}", parsed.market);

    let symbol_stats = position_stops::closed_trade_stats(ctx.db.pool(), &ctx.config.account_id, Some(signal.symbol.as_str()), since).await.ok()?;
    let market_pattern = format!("%{market_suffix}");
    let market_stats = position_stops::closed_trade_stats(ctx.db.pool(), &ctx.config.account_id, Some(market_pattern.as_str()), since).await.ok()?;
    let global_stats = position_stops::closed_trade_stats(ctx.db.pool(), &ctx.config.account_id, None, since).await.ok()?;

    let tiers: [ClosedTradeStats; 3] = [symbol_stats, market_stats, global_stats];
    let params = KellyParams {
        fraction: ctx.config.kelly_fraction,
        max_position: ctx.config.kelly_max_position,
        min_win_rate: ctx.config.kelly_min_win_rate,
        min_trades: ctx.config.kelly_min_trades as i64,
    };
    let tier = qualifying_tier(&tiers, &params)?;
    kelly_budget(tier, net_assets, &params)
}

/// Attempts one immediate smart-rotation sell to free capital for a buy
/// that's otherwise sub-lot, bounded to 1 attempt per signal. Returns the
/// victim symbol on success.
async fn attempt_buy_time_rotation(
    ctx: &AppContext,
    account: &AccountState,
    signal: &Signal,
    regime: Regime,
    market: meridian_core::Market,
) -> Result<Option<String>> {
    let gap_threshold = if signal.score >= 70 {
        ROTATION_GAP_THRESHOLD
    } else if signal.score >= 55 {
        ROTATION_GAP_THRESHOLD + 5
    } else {
        return Ok(None);
    };

    let today = beijing_today();
    let mut candidates: Vec<RotationCandidate> = Vec::new();
    for position in &account.positions {
        if position.quantity <= 0 || position.symbol == signal.symbol {
            continue;
        }
        let Ok(parsed) = position.symbol.parse::<Symbol>() else { continue };
        if parsed.market != market {
            continue;
        }
        let Some(stop) = position_stops::get_active_position(ctx.db.pool(), &ctx.config.account_id, &position.symbol).await? else { continue };
        let Some(klines) = load_klines(ctx, &position.symbol, today).await? else { continue };
        let (indicators, _previous) = compute_with_previous(&klines);
        candidates.push(RotationCandidate {
            symbol: position.symbol.clone(),
            quantity: position.quantity,
            indicators,
            profit_pct: position.pnl_percent(),
            held_since: stop.entry_time,
        });
    }
    if candidates.is_empty() {
        return Ok(None);
    }

    let Some(victim) = select_smart_rotation_candidate(&candidates, regime, signal.score, gap_threshold) else { return Ok(None) };

    if ctx.queue.has_pending_side(&ctx.config.account_id, &victim.symbol, Side::Sell, true).await.unwrap_or(false) {
        return Ok(None);
    }

    let rotation_signal = Signal {
        symbol: victim.symbol.clone(),
        signal_type: SignalType::RotationSell,
        side: Side::Sell,
        score: 0,
        priority: 85,
        price: victim.indicators.last_close,
        quantity: Some(victim.quantity),
        stop_loss: None,
        take_profit: None,
        indicators: victim.indicators.snapshot.clone(),
        reasons: vec!["smart rotation at buy-time".to_string()],
        reason: Some(format!("freeing capital for {}", signal.symbol)),
        timestamp: Utc::now(),
        queued_at: Utc::now(),
        retry_after: None,
        retry_count: 0,
        funds_retry_count: 0,
        failed_at: None,
        account: ctx.config.account_id.clone(),
        _original_json: None,
    };

    if ctx.queue.publish(&ctx.config.account_id, &rotation_signal).await? {
        signal_history::record_emission(ctx.db.pool(), &rotation_signal, "rotation").await?;
        return Ok(Some(victim.symbol.clone()));
    }

    Ok(None)
}

fn exit_close_status(signal_type: SignalType) -> Option<PositionStatus> {
    match signal_type {
        SignalType::StopLoss => Some(PositionStatus::HitStopLoss),
        SignalType::TakeProfit | SignalType::SmartTakeProfit | SignalType::EarlyTakeProfit => Some(PositionStatus::HitTakeProfit),
        SignalType::RotationSell | SignalType::UrgentSell | SignalType::Sell => Some(PositionStatus::Closed),
        // Partial/gradual exits trim the broker-side quantity but leave
        // the stop row active: `PositionStop` carries no quantity field
        // of its own to decrement.
        SignalType::PartialExit | SignalType::GradualExit => None,
        _ => Some(PositionStatus::Closed),
    }
}

async fn handle_sell(ctx: &AppContext, account: &AccountState, signal: &Signal) -> Result<Disposition> {
    let qty = match signal.quantity {
        Some(q) if q > 0 => q,
        _ => {
            let Some(position) = account.position(&signal.symbol) else {
                debug!(symbol = %signal.symbol, "sell signal with no open position, skipping");
                return Ok(Disposition::Done);
            };
            if position.quantity <= 0 {
                return Ok(Disposition::Done);
            }
            let lot_size = ctx.broker.lot_size(&signal.symbol).await.unwrap_or(1).max(1);
            let fraction = match signal.signal_type {
                SignalType::PartialExit => dec!(0.50),
                SignalType::GradualExit => dec!(0.25),
                _ => Decimal::ONE,
            };
            let raw = (Decimal::from(position.quantity) * fraction).floor();
            let lots = (raw / Decimal::from(lot_size)).floor();
            let qty = (lots * Decimal::from(lot_size)).to_string().parse::<i64>().unwrap_or(0);
            if qty == 0 {
                debug!(symbol = %signal.symbol, "rounded sell quantity is zero, skipping");
                return Ok(Disposition::Done);
            }
            qty
        }
    };

    let sell_price = signal.price * dec!(0.999);
    let result = ctx.broker.submit_order(SubmitOrderRequest::limit_day(&signal.symbol, Side::Sell, qty, sell_price)).await?;

    let order = meridian_core::OrderRecord {
        order_id: result.order_id.clone(),
        account_id: ctx.config.account_id.clone(),
        symbol: signal.symbol.clone(),
        side: Side::Sell,
        price: sell_price,
        quantity: qty,
        status: result.status,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    orders::insert_order(ctx.db.pool(), &order).await?;

    let mut pnl = None;
    if let Some(status) = exit_close_status(signal.signal_type) {
        if let Some(stop) = position_stops::get_active_position(ctx.db.pool(), &ctx.config.account_id, &signal.symbol).await? {
            let reason = signal.reason.clone().unwrap_or_else(|| signal.signal_type.as_str().to_string());
            position_stops::close_position(ctx.db.pool(), &ctx.config.account_id, &signal.symbol, status, sell_price, Utc::now(), &reason).await?;
            pnl = Some((sell_price - stop.entry_price, (sell_price - stop.entry_price) / stop.entry_price));
        }
    }

    if let Ok(Some(id)) = signal_history::find_pending_id(ctx.db.pool(), &ctx.config.account_id, &signal.symbol, signal.timestamp).await {
        signal_history::record_execution(ctx.db.pool(), id, ExecutionStatus::Executed, Utc::now(), Some(sell_price), Some(qty), Some(&result.order_id), None).await.ok();
        if let Some((pnl_abs, pnl_pct)) = pnl {
            signal_history::record_pnl(ctx.db.pool(), id, pnl_abs, pnl_pct).await.ok();
        }
    }

    ctx.cache.invalidate(&ctx.config.account_id);
    ctx.queue.wake_up_delayed(&ctx.config.account_id).await.ok();
    ctx.notifier
        .notify("order_filled", &signal.symbol, Severity::Info, &format!("SELL {qty} {} @ {sell_price}", signal.symbol))
        .await;

    Ok(Disposition::Done)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario: every sell-family-adjacent exit signal type.
    /// Expected: terminal position statuses match the reason the sell
    /// fired for, and the two gradual/partial variants stay active.
    #[test]
    fn exit_close_status_maps_terminal_reasons() {
        assert_eq!(exit_close_status(SignalType::StopLoss), Some(PositionStatus::HitStopLoss));
        assert_eq!(exit_close_status(SignalType::TakeProfit), Some(PositionStatus::HitTakeProfit));
        assert_eq!(exit_close_status(SignalType::SmartTakeProfit), Some(PositionStatus::HitTakeProfit));
        assert_eq!(exit_close_status(SignalType::RotationSell), Some(PositionStatus::Closed));
        assert_eq!(exit_close_status(SignalType::UrgentSell), Some(PositionStatus::Closed));
        assert_eq!(exit_close_status(SignalType::PartialExit), None);
        assert_eq!(exit_close_status(SignalType::GradualExit), None);
    }
}
