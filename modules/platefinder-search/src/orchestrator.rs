//! The request orchestrator: a linear sequence of stage calls under one
//! deadline and one cancellation token, with guards that can short-circuit
//! into clarify and a failure detector that turns every internal fault into
//! a recover response. Classifier and upstream errors never escape.

use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};

use ai_client::LlmError;
use places_client::{
    Fetched, LandmarkParams, NearbyParams, Place, PlacesError, TextSearchParams,
};
use platefinder_common::config::StageTimeouts;
use platefinder_common::error::PlatefinderError;
use platefinder_common::protocol::{Channel, RequestStatus, ServerFrame};
use platefinder_common::types::{
    Assist, AssistType, FailureReason, FinalSharedFilters, GateRoute, IntentResult, OpenNow,
    OpenState, Pagination, ProviderCall, QueryLanguage, RestaurantResult, SearchMeta,
    SearchRequest, SearchResponse, SearchRoute, UiLanguage,
};

use crate::city_filter::filter_by_city;
use crate::context::{RequestContext, TimingSlot};
use crate::deps::SearchDeps;
use crate::failure::{detect_failure, FailureInputs};
use crate::filters::{merge_constraints, resolve_shared_filters};
use crate::messages::{assist_message, clarify_question, MessageKind};
use crate::normalize::normalize_to_provider_query;
use crate::post_filter::apply_post_constraints;
use crate::rank::{
    apply_cuisine_scores, rank, select_profile, DEFAULT_INITIAL_RESULTS, MAX_VISIBLE_RESULTS,
    RESULTS_STEP,
};
use crate::stages::constraints::{run_constraints, ConstraintOptions};
use crate::stages::gate::run_gate;
use crate::stages::intent::{run_intent, IntentOptions};
use crate::stages::route_plan::{run_route_plan, RoutePlanOutcome};
use crate::PIPELINE_VERSION;

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub timeouts: StageTimeouts,
    pub strict_city_filter: bool,
    /// Queries shorter than this with no anchor are asked to elaborate.
    pub min_query_tokens: usize,
    /// Classifier memoization is off by default: multi-turn context keying
    /// is intentionally excluded.
    pub memoize_intent: bool,
    pub memoize_constraints: bool,
    pub source_tag: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            timeouts: StageTimeouts::default(),
            strict_city_filter: false,
            min_query_tokens: 2,
            memoize_intent: false,
            memoize_constraints: false,
            source_tag: "google-places".to_string(),
        }
    }
}

pub struct Orchestrator {
    deps: SearchDeps,
    settings: SearchSettings,
}

impl Orchestrator {
    pub fn new(deps: SearchDeps, settings: SearchSettings) -> Self {
        Self { deps, settings }
    }

    /// Run the full pipeline for one request. Never panics outward and never
    /// returns an error: every fault becomes an assist=recover response.
    pub async fn run(&self, request: SearchRequest) -> SearchResponse {
        let mut ctx = RequestContext::new(&request);
        let request_id = ctx.request_id.clone();

        self.publish(&request_id, ServerFrame::Status {
            request_id: request_id.clone(),
            status: RequestStatus::Pending,
        })
        .await;

        let total = self.settings.timeouts.total;
        let outcome = tokio::time::timeout(total, self.pipeline(&request, &mut ctx)).await;

        let mut response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(request_id = %request_id, error = %err, "Pipeline fault, recovering");
                self.recover_response(&ctx, err.failure_reason())
            }
            Err(_) => {
                // Deadline exhausted: cancel outstanding I/O, answer recover.
                ctx.cancel.cancel();
                warn!(request_id = %request_id, "Request deadline exhausted");
                self.recover_response(&ctx, FailureReason::Timeout)
            }
        };

        ctx.finish_timings();
        response.meta.timings_ms.total = ctx.timings.total;

        let final_status = if response.meta.failure_reason.is_critical() {
            RequestStatus::Failed
        } else {
            RequestStatus::Completed
        };
        self.publish(&request_id, ServerFrame::Results {
            request_id: request_id.clone(),
            response: Box::new(response.clone()),
        })
        .await;
        self.publish(&request_id, ServerFrame::Status {
            request_id: request_id.clone(),
            status: final_status,
        })
        .await;

        response
    }

    async fn pipeline(
        &self,
        request: &SearchRequest,
        ctx: &mut RequestContext,
    ) -> Result<SearchResponse, PlatefinderError> {
        // 1. Gate.
        let started = Instant::now();
        let gate = run_gate(
            self.deps.model.as_ref(),
            &request.query,
            ctx.query_language,
            self.settings.timeouts.gate,
            &ctx.cancel,
        )
        .await;
        let gate = ctx.record(TimingSlot::Gate, started, gate);
        info!(
            route = ?gate.route,
            food_signal = ?gate.food_signal,
            confidence = gate.confidence,
            "gate_decision"
        );

        let ui_guess = ui_language_for(gate.language, ctx.query_language);
        match gate.route {
            GateRoute::Stop => {
                return Ok(self.clarify_response(ctx, ui_guess, MessageKind::StopNonFood, "gate_stop", true));
            }
            GateRoute::AskClarify => {
                return Ok(self.clarify_response(ctx, ui_guess, MessageKind::AskClarify, "gate_clarify", false));
            }
            GateRoute::Continue => {}
        }

        // 2. Intent, with the gate's language pinned into the prompt.
        let pinned = if ctx.query_language.is_supported() {
            ctx.query_language
        } else {
            gate.language
        };
        let started = Instant::now();
        let intent = run_intent(
            self.deps.model.as_ref(),
            &self.deps.cache,
            &request.query,
            pinned,
            &IntentOptions {
                timeout: self.settings.timeouts.intent,
                memoize: self.settings.memoize_intent,
                memo_ttl: std::time::Duration::from_secs(600),
            },
            &ctx.cancel,
        )
        .await
        .map_err(|e| classifier_error("intent", e))?;
        let intent = ctx.record(TimingSlot::Intent, started, intent);
        info!(
            route = %intent.route,
            confidence = intent.confidence,
            city = intent.city_text.as_deref().unwrap_or("-"),
            "intent_decision"
        );

        // 3. Early guards.
        if let Some(response) = self.early_guards(request, ctx, &intent) {
            return Ok(response);
        }

        // 4. Shared-filters tightening (region may need a reverse geocode).
        let reverse_region = self.reverse_region_if_needed(ctx, &intent).await;
        let mut filters = resolve_shared_filters(
            &gate,
            &intent,
            ctx.user_region_code.as_deref(),
            reverse_region.as_deref(),
        );

        // 5. Route-LLM and post-constraints run concurrently.
        let started = Instant::now();
        let constraint_options = ConstraintOptions {
            timeout: self.settings.timeouts.post_constraints,
            memoize: self.settings.memoize_constraints,
            memo_ttl: std::time::Duration::from_secs(600),
        };
        let (plan_outcome, constraints) = tokio::join!(
            run_route_plan(
                self.deps.model.as_ref(),
                &request.query,
                &intent,
                &filters,
                ctx.user_location,
                self.settings.timeouts.route_llm,
                &ctx.cancel,
            ),
            run_constraints(
                self.deps.model.as_ref(),
                &self.deps.cache,
                &request.query,
                filters.provider_language,
                &constraint_options,
                &ctx.cancel,
            ),
        );
        let plan_outcome = ctx.record(
            TimingSlot::RouteLlm,
            started,
            plan_outcome.map_err(|e| classifier_error("route_llm", e))?,
        );
        merge_constraints(&mut filters, &constraints);

        let plan = match plan_outcome {
            RoutePlanOutcome::Plan(plan) => plan,
            RoutePlanOutcome::NeedsClarify { reason } => {
                let kind = match reason {
                    "nearby_without_location" => MessageKind::AskLocation,
                    _ => MessageKind::AskCity,
                };
                return Ok(self.clarify_response(ctx, filters.ui_language, kind, reason, true));
            }
        };

        let live_data_requested = intent.hybrid.open_now_requested
            || filters.open_state == Some(OpenState::OpenNow);

        // 6. Provider call, with canonical → provider normalization.
        let started = Instant::now();
        let (fetched, plan_city) = self
            .call_provider(&plan.call, &filters, &intent, live_data_requested, ctx)
            .await?;
        ctx.record(TimingSlot::Provider, started, ());
        if fetched.from_cache {
            ctx.cache_hits += 1;
        }

        let mut results: Vec<RestaurantResult> = fetched
            .value
            .into_iter()
            .map(|p| self.to_result(p))
            .collect();
        let fetched_count = results.len();

        // 7. City filter + deterministic post-filter.
        let started = Instant::now();
        let city_text = plan_city.or_else(|| intent.city_text.clone());
        let mut geocoding_failed = false;
        if let Some(city) = city_text.as_deref() {
            match self
                .deps
                .geocoder
                .geocode(city, filters.provider_language, &filters.region_code, &ctx.cancel)
                .await
            {
                Ok(Some(point)) => {
                    results = filter_by_city(results, point.center, self.settings.strict_city_filter);
                }
                Ok(None) => {
                    warn!(city, "City geocoding returned nothing, skipping city filter");
                    geocoding_failed = true;
                }
                Err(e) => {
                    warn!(city, error = %e, "City geocoding failed, skipping city filter");
                    geocoding_failed = true;
                }
            }
        }
        results = apply_post_constraints(results, &filters, Utc::now());
        ctx.record(TimingSlot::PostFilter, started, ());

        // 8. Rank, memoized on (result set, intent) hashes.
        let started = Instant::now();
        if let Some(cuisine) = intent.hybrid.cuisine_key.as_deref() {
            let provider_query = normalize_to_provider_query(cuisine);
            apply_cuisine_scores(&mut results, cuisine, &provider_query);
        }
        let profile = select_profile(ctx.user_location, &intent.hybrid);
        let rank_key = rank_cache_key(&results, &intent);
        match self.deps.cache.get::<Vec<String>>(&rank_key).await {
            Some(order) => {
                ctx.cache_hits += 1;
                if let Some(user) = ctx.user_location {
                    for result in results.iter_mut() {
                        result.distance_km =
                            Some(platefinder_common::types::haversine_km(user, result.location));
                    }
                }
                reorder_by(&mut results, &order.value);
            }
            None => {
                rank(&mut results, profile, ctx.user_location);
                let order: Vec<String> = results.iter().map(|r| r.place_id.clone()).collect();
                self.deps
                    .cache
                    .put(
                        &rank_key,
                        &platefinder_common::cache::CacheEntry::found(order),
                        std::time::Duration::from_secs(15 * 60),
                    )
                    .await;
            }
        }
        ctx.record(TimingSlot::Rank, started, ());
        info!(profile = %profile, pool = results.len(), "rank_decision");

        // 9. Assemble, trigger enrichment, answer.
        let failure_reason = detect_failure(FailureInputs {
            explicit: None,
            geocoding_failed,
            results: &results,
            intent_confidence: intent.confidence,
            live_data_requested,
        });

        if failure_reason.is_critical() {
            return Ok(self.recover_response(ctx, failure_reason));
        }

        let available_count = results.len().min(MAX_VISIBLE_RESULTS);
        results.truncate(DEFAULT_INITIAL_RESULTS);

        self.deps
            .enricher
            .enrich(&ctx.request_id, &mut results, city_text.as_deref())
            .await;

        Ok(SearchResponse {
            meta: SearchMeta {
                source: self.settings.source_tag.clone(),
                pipeline_version: PIPELINE_VERSION.to_string(),
                failure_reason,
                timings_ms: ctx.timings,
                pagination: Pagination {
                    fetched_count,
                    returned_count: results.len(),
                    available_count,
                    next_increment: RESULTS_STEP,
                    max_visible: MAX_VISIBLE_RESULTS,
                },
                region_source: filters.region_source.to_string(),
                language_source: filters.language_source.to_string(),
                cache_hits: ctx.cache_hits,
            },
            assist: Assist::normal(),
            results,
        })
    }

    /// Early guards, in order. Each can return a terminal clarify response.
    fn early_guards(
        &self,
        request: &SearchRequest,
        ctx: &RequestContext,
        intent: &IntentResult,
    ) -> Option<SearchResponse> {
        let ui = ui_language_for(intent.language, ctx.query_language);
        let has_user_location = ctx.user_location.is_some();
        let has_city_text = intent
            .city_text
            .as_deref()
            .map_or(false, |c| !c.is_empty());

        if intent.route == SearchRoute::Nearby && !has_user_location {
            return Some(self.clarify_response(
                ctx,
                ui,
                MessageKind::AskLocation,
                "nearby_without_location",
                true,
            ));
        }

        if intent.route == SearchRoute::Textsearch {
            // Region code is a market hint, never a location anchor.
            let allowed = has_user_location || has_city_text;
            info!(
                allowed,
                has_user_location, has_city_text, "textsearch_anchor_eval"
            );
            if !allowed {
                return Some(self.clarify_response(
                    ctx,
                    ui,
                    MessageKind::AskCity,
                    "textsearch_without_anchor",
                    true,
                ));
            }
        }

        let token_count = request.query.split_whitespace().count();
        let has_anchor = has_user_location || has_city_text;
        if token_count < self.settings.min_query_tokens && !has_anchor {
            return Some(self.clarify_response(
                ctx,
                ui,
                MessageKind::QueryTooShort,
                "query_too_short",
                false,
            ));
        }

        None
    }

    async fn reverse_region_if_needed(
        &self,
        ctx: &RequestContext,
        intent: &IntentResult,
    ) -> Option<String> {
        let candidate_locks =
            platefinder_common::sanitize_region_code(intent.region_candidate.as_deref()).is_some();
        let location = ctx.user_location?;
        if candidate_locks {
            return None;
        }
        match self.deps.geocoder.reverse_region(location, &ctx.cancel).await {
            Ok(region) => region,
            Err(e) => {
                warn!(error = %e, "Reverse geocode failed, falling through region sources");
                None
            }
        }
    }

    async fn call_provider(
        &self,
        call: &ProviderCall,
        filters: &FinalSharedFilters,
        intent: &IntentResult,
        live_data: bool,
        ctx: &RequestContext,
    ) -> Result<(Fetched<Vec<Place>>, Option<String>), PlatefinderError> {
        let outcome = match call {
            ProviderCall::TextSearch {
                text_query,
                bias,
                city_text,
            } => {
                let params = TextSearchParams {
                    query: text_query.clone(),
                    bias: *bias,
                    language: filters.provider_language,
                    region: filters.region_code.clone(),
                    live_data,
                };
                (
                    self.deps.places.text_search(&params, &ctx.cancel).await,
                    city_text.clone(),
                )
            }
            ProviderCall::Nearby {
                center,
                radius_m,
                keyword,
            } => {
                let params = NearbyParams {
                    center: *center,
                    radius_m: *radius_m,
                    keyword: normalize_to_provider_query(keyword),
                    language: filters.provider_language,
                    region: filters.region_code.clone(),
                    live_data,
                };
                (
                    self.deps.places.nearby_search(&params, &ctx.cancel).await,
                    intent.city_text.clone(),
                )
            }
            ProviderCall::Landmark {
                geocode_query,
                radius_m,
                keyword,
            } => {
                let params = LandmarkParams {
                    geocode_query: geocode_query.clone(),
                    radius_m: *radius_m,
                    keyword: normalize_to_provider_query(keyword),
                    language: filters.provider_language,
                    region: filters.region_code.clone(),
                    live_data,
                };
                (
                    self.deps.places.landmark_plan(&params, &ctx.cancel).await,
                    intent.city_text.clone(),
                )
            }
        };

        let (result, city) = outcome;
        let fetched = result.map_err(provider_error)?;
        Ok((fetched, city))
    }

    fn to_result(&self, place: Place) -> RestaurantResult {
        RestaurantResult {
            place_id: place.place_id,
            source: self.settings.source_tag.clone(),
            name: place.name,
            address: place.address,
            location: place.location,
            rating: place.rating,
            reviews_count: place.reviews_count,
            price_level: place.price_level,
            open_now: match place.open_now {
                Some(open) => OpenNow::Known(open),
                None => OpenNow::Unknown,
            },
            tags: place.tags,
            google_maps_url: place.maps_url,
            cuisine_score: None,
            city_match: None,
            distance_km: None,
            providers: Default::default(),
        }
    }

    fn clarify_response(
        &self,
        ctx: &RequestContext,
        ui: UiLanguage,
        kind: MessageKind,
        reason: &str,
        blocks_search: bool,
    ) -> SearchResponse {
        info!(reason, "clarify_decision");
        let choices = if kind == MessageKind::AskCity {
            let region = ctx
                .user_region_code
                .as_deref()
                .unwrap_or(platefinder_common::region::DEFAULT_REGION);
            crate::messages::city_choices(region, ui)
        } else {
            Vec::new()
        };
        SearchResponse {
            results: Vec::new(),
            assist: Assist {
                kind: AssistType::Clarify,
                reason: reason.to_string(),
                message: assist_message(kind, ui).to_string(),
                question: Some(clarify_question(kind, ui).to_string()),
                choices,
                blocks_search,
            },
            meta: self.empty_meta(ctx, FailureReason::None),
        }
    }

    fn recover_response(&self, ctx: &RequestContext, reason: FailureReason) -> SearchResponse {
        let ui = ui_language_for(ctx.query_language, ctx.query_language);
        error!(failure_reason = %reason, "recover_decision");
        SearchResponse {
            results: Vec::new(),
            assist: Assist {
                kind: AssistType::Recover,
                reason: reason.to_string(),
                message: assist_message(MessageKind::Recover, ui).to_string(),
                question: None,
                choices: Vec::new(),
                blocks_search: false,
            },
            meta: self.empty_meta(ctx, reason),
        }
    }

    fn empty_meta(&self, ctx: &RequestContext, reason: FailureReason) -> SearchMeta {
        SearchMeta {
            source: self.settings.source_tag.clone(),
            pipeline_version: PIPELINE_VERSION.to_string(),
            failure_reason: reason,
            timings_ms: ctx.timings,
            pagination: Pagination {
                fetched_count: 0,
                returned_count: 0,
                available_count: 0,
                next_increment: RESULTS_STEP,
                max_visible: MAX_VISIBLE_RESULTS,
            },
            region_source: String::new(),
            language_source: String::new(),
            cache_hits: ctx.cache_hits,
        }
    }

    async fn publish(&self, request_id: &str, frame: ServerFrame) {
        self.deps
            .sink
            .publish(Channel::Search, request_id, frame)
            .await;
    }
}

/// `rank:<resHash>:<intentHash>` — a repeat of the same pool under the same
/// intent reuses the previous ordering.
fn rank_cache_key(results: &[RestaurantResult], intent: &IntentResult) -> String {
    let mut ids: Vec<&str> = results.iter().map(|r| r.place_id.as_str()).collect();
    ids.sort_unstable();
    let res_hash = ai_client::short_hash(&ids.join(","));
    let intent_hash = ai_client::short_hash(
        &serde_json::to_string(intent).unwrap_or_default(),
    );
    format!("rank:{res_hash}:{intent_hash}")
}

/// Restore a cached ordering; ids missing from the order keep their current
/// relative position at the tail.
fn reorder_by(results: &mut Vec<RestaurantResult>, order: &[String]) {
    let position: std::collections::HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    results.sort_by_key(|r| {
        position
            .get(r.place_id.as_str())
            .copied()
            .unwrap_or(usize::MAX)
    });
}

fn ui_language_for(stage_language: QueryLanguage, detected: QueryLanguage) -> UiLanguage {
    if stage_language == QueryLanguage::He || detected == QueryLanguage::He {
        UiLanguage::He
    } else {
        UiLanguage::En
    }
}

fn classifier_error(stage: &'static str, err: LlmError) -> PlatefinderError {
    match err {
        LlmError::Timeout => PlatefinderError::ClassifierTimeout(stage),
        LlmError::Cancelled => PlatefinderError::Cancelled,
        LlmError::Quota => PlatefinderError::ClassifierQuota(stage),
        other => PlatefinderError::Classifier {
            stage,
            message: other.to_string(),
        },
    }
}

fn provider_error(err: PlacesError) -> PlatefinderError {
    match err {
        PlacesError::Quota => PlatefinderError::UpstreamQuota,
        PlacesError::Timeout => PlatefinderError::UpstreamTimeout,
        PlacesError::Cancelled => PlatefinderError::Cancelled,
        PlacesError::Provider { ref code, ref message } if code == "GEOCODE_ZERO_RESULTS" => {
            PlatefinderError::Geocoding(message.clone())
        }
        PlacesError::Api { status, message } => PlatefinderError::Upstream { status, message },
        other => PlatefinderError::Upstream {
            status: 0,
            message: other.to_string(),
        },
    }
}
