//! Signal Generator: subscribes to realtime quotes, scans the
//! watchlist and held positions, and publishes entry/exit/rotation
//! signals to the queue.
//!
//! Architected/§9's explicit re-architecture note: the main
//! scan loop, the background rotation loop, and the realtime push
//! handler are independent cooperative tasks that only *produce* events
//! into an internal `mpsc` channel; a single task owns `SgState` (the
//! dedup cohort, cached regime, panic monitor) and consumes that channel
//! serially, so in-memory state is never touched from more than one task
//! — eliminating the cross-task mutation hazards the source language's
//! implicit event loop allowed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveDate, Utc};
use meridian_core::{
    AccountState, Error, PositionSnapshot, PositionStop, Result, Side, Signal, SignalType, Symbol,
};
use meridian_engine::budget::target_currency;
use meridian_engine::dedup::check_entry_dedup;
use meridian_engine::regime::CachedRegime;
use meridian_engine::{
    add_position::{add_position_quantity, check_add_position, AddPositionCandidate, AddPositionParams},
    classify_regime, score_entry, score_exit, select_preclose_rotation_sells, select_rescue_candidate,
    CohortTracker, ExitAction, IndexVote, PanicMonitor, Regime, RotationCandidate, ROTATION_GAP_THRESHOLD,
};
use meridian_indicators::{
    compute_with_previous, is_option_symbol, ComputedIndicators, HybridKlineLoader, Indicator, Kline,
    KlineApiSource, KlineDbSource, Sma,
};
use meridian_networking::{Broker, CandlePeriod, Notifier, Quote, Severity, WebSocketClient};
use meridian_persistence::db::{calendar, orders, position_stops, signal_history, PgKlineStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::context::AppContext;

/// Events fed into the single state-owning task. `Scan`/`Rotation` are
/// ticked by dedicated timer tasks; `Quote` is forwarded from the quote
/// WebSocket's broadcast stream.
enum Event {
    Scan,
    Rotation,
    Quote(Quote),
}

struct SgState {
    cohort: CohortTracker,
    regime_cache: Option<CachedRegime>,
    panic: PanicMonitor,
    scan_count: u64,
    last_realtime_eval: HashMap<String, DateTime<Utc>>,
}

impl SgState {
    fn new(vixy_panic_threshold: Decimal) -> Self {
        Self {
            cohort: CohortTracker::new(),
            regime_cache: None,
            panic: PanicMonitor::new(vixy_panic_threshold),
            scan_count: 0,
            last_realtime_eval: HashMap::new(),
        }
    }
}

/// Adapts the broker's candlestick endpoint to `KlineApiSource`, so the
/// hybrid loader can pull the live tail without caring that
/// it's talking to a REST broker rather than a local store.
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

/// Runs the signal-generator until its channel closes (shutdown signal
/// from `main`). On shutdown: drain the current signal, then close
/// subscriptions.
pub async fn run(ctx: AppContext, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
    let ctx = Arc::new(ctx);

    let mut subscribe_symbols = ctx.config.watchlist.clone();
    subscribe_symbols.push("VIXY.US".to_string());
    subscribe_symbols.dedup();

    let mut ws = WebSocketClient::spawn(ctx.config.broker_ws_url.clone());
    ws.subscribe(subscribe_symbols);
    let mut quote_rx = ws.subscribe_stream();

    let (tx, mut rx) = mpsc::channel::<Event>(512);

    let scan_tx = tx.clone();
    let scan_interval = StdDuration::from_secs(ctx.config.scan_interval_seconds.max(1));
    let scan_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(scan_interval);
        loop {
            ticker.tick().await;
            if scan_tx.send(Event::Scan).await.is_err() {
                break;
            }
        }
    });

    let rotation_tx = tx.clone();
    let rotation_interval = StdDuration::from_secs(ctx.config.rotation_interval_seconds.max(1));
    let rotation_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(rotation_interval);
        loop {
            ticker.tick().await;
            if rotation_tx.send(Event::Rotation).await.is_err() {
                break;
            }
        }
    });

    let quote_tx = tx.clone();
    let quote_task = tokio::spawn(async move {
        loop {
            match quote_rx.recv().await {
                Ok(quote) => {
                    if quote_tx.send(Event::Quote(quote)).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "quote broadcast lagged, dropping backlog");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    drop(tx);

    let mut state = SgState::new(ctx.config.vixy_panic_threshold);
    info!(account = %ctx.config.account_id, "signal-generator started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("shutdown requested, closing quote subscription");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                let outcome = match event {
                    Event::Scan => run_scan(&ctx, &mut state).await,
                    Event::Rotation => run_rotation(&ctx, &mut state).await,
                    Event::Quote(quote) => handle_quote(&ctx, &mut state, quote).await,
                };
                if let Err(e) = outcome {
                    warn!("signal-generator iteration error: {e}");
                }
            }
        }
    }

    scan_task.abort();
    rotation_task.abort();
    quote_task.abort();
    ws.close().await;
    Ok(())
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

fn beijing_today(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&chrono_tz::Asia::Shanghai).date_naive()
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
            debug!(symbol, rows, "data shortage, skipping this iteration");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn index_vote(ctx: &AppContext, symbol: &str, inverse_symbols: &[String], today: NaiveDate) -> Result<Option<IndexVote>> {
    if is_option_symbol(symbol) {
        return Ok(None);
    }
    let Some(klines) = load_klines(ctx, symbol, today).await? else { return Ok(None) };
    let mut sma200 = Sma::new(200);
    sma200.update_batch(&klines)?;
    let Some(ma200) = sma200.value().and_then(|v| v.value.single()) else { return Ok(None) };
    let close = klines.last().map(|k| k.close).unwrap_or_default();
    let inverse = inverse_symbols.iter().any(|s| s == symbol);
    Ok(Some(IndexVote { inverse, close, ma200 }))
}

/// Classify (or reuse the cached) market regime.
async fn current_regime(ctx: &AppContext, state: &mut SgState) -> Result<Regime> {
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

    let today = beijing_today(now);
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

/// Scan loop, run once per `Event::Scan` and once (throttled)
/// per expedited realtime tick.
async fn run_scan(ctx: &AppContext, state: &mut SgState) -> Result<()> {
    let now = Utc::now();
    let today = beijing_today(now);

    state.cohort.roll_day_if_needed(today);
    let today_orders = orders::today_orders(ctx.db.pool(), &ctx.config.account_id, today).await?;
    state.cohort.cohort.merge_traded_today(today_orders.into_iter().map(|o| o.symbol));

    let account = refresh_account(ctx).await?;
    state.cohort.cohort.merge_current_positions(account.positions.iter().map(|p| p.symbol.clone()));

    let regime = current_regime(ctx, state).await?;
    if ctx.config.vixy_alert_enabled {
        refresh_panic(ctx, state, today).await?;
    }

    for symbol in ctx.config.watchlist.clone() {
        if let Err(e) = scan_symbol(ctx, state, &symbol, today, regime, &account).await {
            warn!(symbol, "scan symbol failed: {e}");
        }
    }

    for position in account.positions.clone() {
        if let Err(e) = check_exit(ctx, state, &position, today, regime).await {
            warn!(symbol = %position.symbol, "exit check failed: {e}");
        }
    }

    state.scan_count += 1;
    if state.scan_count % 10 == 0 {
        state.cohort.cohort.prune_older_than(now, chrono::Duration::hours(1));
    }

    Ok(())
}

async fn refresh_panic(ctx: &AppContext, state: &mut SgState, today: NaiveDate) -> Result<()> {
    let quotes = ctx.broker.get_realtime_quote(&["VIXY.US".to_string()]).await?;
    let Some(quote) = quotes.into_iter().find(|q| q.symbol == "VIXY.US") else { return Ok(()) };
    let ma200 = index_vote(ctx, "VIXY.US", &[], today).await.ok().flatten().map(|v| v.ma200);
    state.panic.on_tick(quote.last_price, ma200, &ctx.vixy_kv, ctx.notifier.as_ref()).await;
    Ok(())
}

async fn scan_symbol(
    ctx: &AppContext,
    state: &mut SgState,
    symbol: &str,
    today: NaiveDate,
    regime: Regime,
    account: &AccountState,
) -> Result<()> {
    let parsed: Symbol = symbol.parse()?;
    if !calendar::is_market_open(ctx.db.pool(), parsed.market, Utc::now()).await? {
        return Ok(());
    }

    let Some(klines) = load_klines(ctx, symbol, today).await? else { return Ok(()) };
    let (indicators, _previous) = compute_with_previous(&klines);

    let entry = score_entry(&indicators);
    let Some(signal_type) = entry.signal_type else { return Ok(()) };
    if signal_type == SignalType::WeakBuy && !ctx.config.enable_weak_buy {
        return Ok(());
    }

    if state.panic.is_panicking() {
        debug!(symbol, "VIXY panic active, suppressing BUY candidate");
        return Ok(());
    }

    if let Some(block) =
        check_entry_dedup(&ctx.queue, &ctx.config.account_id, &state.cohort, symbol, signal_type, Utc::now()).await?
    {
        debug!(symbol, reason = block.reason(), "entry blocked by dedup");
        return Ok(());
    }

    let side = signal_type.side();
    let currency = target_currency(parsed.market);
    let price = indicators.last_close;

    // Buying-power pre-check.
    let estimate = ctx
        .broker
        .estimate_max_purchase_quantity(symbol, meridian_networking::OrderType::Limit, side, price, currency)
        .await
        .ok();
    let api_max = estimate.as_ref().map(|e| e.margin_max_qty.max(e.cash_max_qty)).unwrap_or(0);
    if api_max == 0 && account.available_budget(currency) <= Decimal::ZERO {
        ctx.notifier
            .notify(
                "no_buying_power",
                symbol,
                Severity::Warning,
                &format!("cannot size {symbol} BUY: broker estimate and cash fallback both zero"),
            )
            .await;
        return Ok(());
    }

    let (stop_loss, take_profit) = indicators.atr.map(|atr| (price - atr * dec!(2.5), price + atr * dec!(3.5))).unzip();

    let signal = Signal {
        symbol: symbol.to_string(),
        signal_type,
        side,
        score: entry.total,
        priority: entry.total,
        price,
        quantity: None,
        stop_loss,
        take_profit,
        indicators: indicators.snapshot.clone(),
        reasons: entry.reasons,
        reason: None,
        timestamp: Utc::now(),
        queued_at: Utc::now(),
        retry_after: None,
        retry_count: 0,
        funds_retry_count: 0,
        failed_at: None,
        account: ctx.config.account_id.clone(),
        _original_json: None,
    };

    if ctx.queue.publish(&ctx.config.account_id, &signal).await? {
        state.cohort.cohort.record_emission(symbol.to_string(), Utc::now());
        signal_history::record_emission(ctx.db.pool(), &signal, "entry").await?;
    }

    Ok(())
}

fn exit_signal_type(action: ExitAction) -> Option<SignalType> {
    match action {
        ExitAction::StopLoss => Some(SignalType::StopLoss),
        ExitAction::TakeProfit => Some(SignalType::TakeProfit),
        ExitAction::TakeProfitNow => Some(SignalType::SmartTakeProfit),
        ExitAction::PartialExit => Some(SignalType::PartialExit),
        ExitAction::GradualExit => Some(SignalType::GradualExit),
        ExitAction::StrongHold | ExitAction::Hold | ExitAction::SmartHold { .. } => None,
    }
}

async fn check_exit(ctx: &AppContext, state: &mut SgState, position: &PositionSnapshot, today: NaiveDate, regime: Regime) -> Result<()> {
    let symbol = &position.symbol;
    let Ok(parsed) = symbol.parse::<Symbol>() else { return Ok(()) };
    if !calendar::is_market_open(ctx.db.pool(), parsed.market, Utc::now()).await? {
        return Ok(());
    }

    let Some(stop) = position_stops::get_active_position(ctx.db.pool(), &ctx.config.account_id, symbol).await? else {
        return Ok(());
    };
    let Some(klines) = load_klines(ctx, symbol, today).await? else { return Ok(()) };
    let (indicators, _previous) = compute_with_previous(&klines);

    let decision = score_exit(&indicators, &stop, regime, ctx.config.gradual_exit_enabled);

    if matches!(decision.action, ExitAction::SmartHold { .. }) {
        if let ExitAction::SmartHold { new_stop_loss, new_take_profit } = decision.action {
            debug!(symbol, %new_stop_loss, %new_take_profit, "smart hold: stop/target extension noted, not persisted (see DESIGN.md)");
        }
        return Ok(());
    }
    if matches!(decision.action, ExitAction::StrongHold | ExitAction::Hold) {
        maybe_add_position(ctx, state, position, &stop, &indicators, regime, decision.score).await?;
        return Ok(());
    }

    let Some(signal_type) = exit_signal_type(decision.action) else { return Ok(()) };

    if ctx.queue.has_pending_side(&ctx.config.account_id, symbol, Side::Sell, true).await.unwrap_or(false) {
        return Ok(());
    }

    let qty = (Decimal::from(position.quantity) * decision.quantity_fraction).floor().to_string().parse::<i64>().unwrap_or(0).max(0);
    if qty == 0 {
        return Ok(());
    }

    let signal = Signal {
        symbol: symbol.clone(),
        signal_type,
        side: Side::Sell,
        score: decision.score,
        priority: decision.priority,
        price: indicators.last_close,
        quantity: Some(qty),
        stop_loss: Some(stop.stop_loss),
        take_profit: Some(stop.take_profit),
        indicators: indicators.snapshot.clone(),
        reasons: decision.reasons.clone(),
        reason: decision.reasons.first().cloned(),
        timestamp: Utc::now(),
        queued_at: Utc::now(),
        retry_after: None,
        retry_count: 0,
        funds_retry_count: 0,
        failed_at: None,
        account: ctx.config.account_id.clone(),
        _original_json: None,
    };

    if ctx.queue.publish(&ctx.config.account_id, &signal).await? {
        signal_history::record_emission(ctx.db.pool(), &signal, "exit").await?;
    }

    Ok(())
}

async fn maybe_add_position(
    ctx: &AppContext,
    state: &mut SgState,
    position: &PositionSnapshot,
    stop: &PositionStop,
    indicators: &ComputedIndicators,
    regime: Regime,
    exit_score: i32,
) -> Result<()> {
    let _ = stop;
    if !ctx.config.add_position_enabled {
        return Ok(());
    }

    let entry = score_entry(indicators);
    let candidate = AddPositionCandidate {
        regime,
        position_profit_pct: position.pnl_percent(),
        exit_score,
        fresh_entry_score: entry.total,
    };
    let params = AddPositionParams {
        min_profit_pct: ctx.config.add_position_min_profit_pct / dec!(100),
        min_entry_score: ctx.config.add_position_min_signal_score,
        max_exit_score: -30,
        pct_of_position: ctx.config.add_position_pct,
    };

    if let Some(block) = check_add_position(&candidate, &params) {
        debug!(symbol = %position.symbol, reason = block.reason(), "add_position blocked");
        return Ok(());
    }
    if !state.cohort.add_position_eligible(
        &position.symbol,
        Utc::now(),
        ctx.config.add_position_cooldown_minutes,
        ctx.config.add_position_max_per_day,
    ) {
        return Ok(());
    }

    let qty = add_position_quantity(position.quantity, ctx.config.add_position_pct);
    if qty < 1 {
        return Ok(());
    }

    let signal = Signal {
        symbol: position.symbol.clone(),
        signal_type: SignalType::AddPosition,
        side: Side::Buy,
        score: entry.total,
        priority: entry.total,
        price: indicators.last_close,
        quantity: Some(qty),
        stop_loss: None,
        take_profit: None,
        indicators: indicators.snapshot.clone(),
        reasons: entry.reasons,
        reason: None,
        timestamp: Utc::now(),
        queued_at: Utc::now(),
        retry_after: None,
        retry_count: 0,
        funds_retry_count: 0,
        failed_at: None,
        account: ctx.config.account_id.clone(),
        _original_json: None,
    };

    if ctx.queue.publish(&ctx.config.account_id, &signal).await? {
        state.cohort.record_add_position(position.symbol.clone(), Utc::now());
        signal_history::record_emission(ctx.db.pool(), &signal, "add_position").await?;
    }

    Ok(())
}

/// Background rotation loop.
async fn run_rotation(ctx: &AppContext, state: &mut SgState) -> Result<()> {
    let now = Utc::now();
    let hk_open = calendar::is_market_open(ctx.db.pool(), meridian_core::Market::Hk, now).await.unwrap_or(false);
    let us_open = calendar::is_market_open(ctx.db.pool(), meridian_core::Market::Us, now).await.unwrap_or(false);
    if !hk_open && !us_open {
        return Ok(());
    }

    let account = refresh_account(ctx).await?;
    let regime = current_regime(ctx, state).await?;
    let today = beijing_today(now);
    let beijing_time = now.with_timezone(&chrono_tz::Asia::Shanghai).time();

    let hk_preclose = beijing_time >= chrono::NaiveTime::from_hms_opt(15, 30, 0).unwrap()
        && beijing_time <= chrono::NaiveTime::from_hms_opt(16, 0, 0).unwrap();
    let us_preclose = beijing_time >= chrono::NaiveTime::from_hms_opt(22, 0, 0).unwrap()
        && beijing_time <= chrono::NaiveTime::from_hms_opt(23, 59, 0).unwrap();

    if hk_preclose || us_preclose {
        let market = if hk_preclose { meridian_core::Market::Hk } else { meridian_core::Market::Us };
        let candidates = build_rotation_candidates(ctx, &account, market, today).await?;
        if !candidates.is_empty() {
            let count = (candidates.len() / 4).max(1);
            let sells = select_preclose_rotation_sells(&candidates, regime, now, count);
            for candidate in sells {
                publish_rotation_sell(ctx, candidate, "pre-close rotation").await?;
            }
        }
    }

    rescue_stuck_buys(ctx, &account, regime, today).await?;

    Ok(())
}

async fn build_rotation_candidates(
    ctx: &AppContext,
    account: &AccountState,
    market: meridian_core::Market,
    today: NaiveDate,
) -> Result<Vec<RotationCandidate>> {
    let mut out = Vec::new();
    for position in &account.positions {
        if position.quantity <= 0 {
            continue;
        }
        let Ok(parsed) = position.symbol.parse::<Symbol>() else { continue };
        if parsed.market != market {
            continue;
        }
        let Some(stop) = position_stops::get_active_position(ctx.db.pool(), &ctx.config.account_id, &position.symbol).await? else {
            continue;
        };
        let Some(klines) = load_klines(ctx, &position.symbol, today).await? else { continue };
        let (indicators, _previous) = compute_with_previous(&klines);
        out.push(RotationCandidate {
            symbol: position.symbol.clone(),
            quantity: position.quantity,
            indicators,
            profit_pct: position.pnl_percent(),
            held_since: stop.entry_time,
        });
    }
    Ok(out)
}

/// Rescues high-score buys stuck in the delayed or failed sub-queues by
/// sacrificing a sufficiently weak held position.
async fn rescue_stuck_buys(ctx: &AppContext, account: &AccountState, regime: Regime, today: NaiveDate) -> Result<()> {
    let min_score = ctx.config.realtime_rotation_min_signal_score;
    let window = StdDuration::from_secs(300);

    let mut stuck: Vec<(Signal, bool)> = Vec::new();
    for signal in ctx.queue.get_delayed_signals(&ctx.config.account_id, min_score, window).await? {
        stuck.push((signal, false));
    }
    for signal in ctx.queue.get_failed_signals(&ctx.config.account_id, min_score, window).await? {
        stuck.push((signal, true));
    }

    for (signal, was_failed) in stuck {
        if !signal.signal_type.is_buy_family() {
            continue;
        }
        let Ok(parsed) = signal.symbol.parse::<Symbol>() else { continue };
        let candidates = build_rotation_candidates(ctx, account, parsed.market, today).await?;
        if candidates.is_empty() {
            continue;
        }
        let Some(victim) = select_rescue_candidate(signal.score, &candidates, regime, ROTATION_GAP_THRESHOLD) else { continue };

        publish_rotation_sell(ctx, victim, "smart rotation rescue").await?;

        if was_failed {
            ctx.queue.recover_failed(&ctx.config.account_id, &signal).await?;
        }
        // A delayed (not yet failed) entry needs no explicit recovery: it
        // is already in `main`, and OE's `wake_up_delayed_signals` (called
        // after the rescue sell fills) strips its `retry_after`.
    }

    Ok(())
}

async fn publish_rotation_sell(ctx: &AppContext, candidate: &RotationCandidate, reason: &str) -> Result<()> {
    if ctx.queue.has_pending_side(&ctx.config.account_id, &candidate.symbol, Side::Sell, true).await.unwrap_or(false) {
        return Ok(());
    }

    let signal = Signal {
        symbol: candidate.symbol.clone(),
        signal_type: SignalType::RotationSell,
        side: Side::Sell,
        score: 0,
        priority: 85,
        price: candidate.indicators.last_close,
        quantity: Some(candidate.quantity),
        stop_loss: None,
        take_profit: None,
        indicators: candidate.indicators.snapshot.clone(),
        reasons: vec![reason.to_string()],
        reason: Some(reason.to_string()),
        timestamp: Utc::now(),
        queued_at: Utc::now(),
        retry_after: None,
        retry_count: 0,
        funds_retry_count: 0,
        failed_at: None,
        account: ctx.config.account_id.clone(),
        _original_json: None,
    };

    if ctx.queue.publish(&ctx.config.account_id, &signal).await? {
        signal_history::record_emission(ctx.db.pool(), &signal, "rotation").await?;
        info!(symbol = %candidate.symbol, reason, "rotation sell published");
    }

    Ok(())
}

/// Realtime push handler: VIXY ticks always re-run the panic
/// check; held-position and watchlist ticks are throttled to avoid
/// re-running full indicator scoring on every single quote.
async fn handle_quote(ctx: &AppContext, state: &mut SgState, quote: Quote) -> Result<()> {
    let now = Utc::now();
    let today = beijing_today(now);

    if quote.symbol == "VIXY.US" {
        if ctx.config.vixy_alert_enabled {
            let ma200 = index_vote(ctx, "VIXY.US", &[], today).await.ok().flatten().map(|v| v.ma200);
            state.panic.on_tick(quote.last_price, ma200, &ctx.vixy_kv, ctx.notifier.as_ref()).await;
        }
        return Ok(());
    }

    const REALTIME_THROTTLE: StdDuration = StdDuration::from_secs(15);
    let due = state
        .last_realtime_eval
        .get(&quote.symbol)
        .map(|last| now.signed_duration_since(*last).to_std().map(|d| d >= REALTIME_THROTTLE).unwrap_or(true))
        .unwrap_or(true);
    if !due {
        return Ok(());
    }
    state.last_realtime_eval.insert(quote.symbol.clone(), now);

    let Some(account) = ctx.cache.get(&ctx.config.account_id) else { return Ok(()) };
    let regime = current_regime(ctx, state).await?;

    if let Some(position) = account.position(&quote.symbol).cloned() {
        check_exit(ctx, state, &position, today, regime).await?;
    } else if ctx.config.watchlist.iter().any(|s| s == &quote.symbol) {
        scan_symbol(ctx, state, &quote.symbol, today, regime, &account).await?;
    }

    Ok(())
}
