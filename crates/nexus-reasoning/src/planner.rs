//! Hierarchical task planner for emergency response.
//!
//! Every emergency decomposes into the same four compound tasks, each a
//! fixed list of primitives:
//!
//! | Phase    | Primitives                                              |
//! |----------|---------------------------------------------------------|
//! | Dispatch | assign vehicle, compute route                           |
//! | Navigate | monitor obstacles, re-route if blocked, follow path     |
//! | Resolve  | assess, provide aid, clear site                         |
//! | Return   | compute return route, travel to base, report complete   |
//!
//! Advancing a plan executes one primitive per tick. A primitive that
//! cannot complete yet (no responder free, no path, still driving) is
//! retried on the next tick with the cursor unchanged. When the cursor
//! runs off the end the emergency is resolved and the vehicle released.
//! A plan is abandoned only when its emergency disappears or on an
//! internal fault, which is reported as a critical event.

use std::collections::BTreeMap;

use nexus_types::{
    Emergency, EmergencyId, EmergencyKind, EmergencyState, EngineId, Event, EventType, GridPos,
    PlanId, Severity, Vehicle, VehicleId, VehicleStatus,
};
use nexus_world::{Algorithm, CityMap, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::output::{EngineOutput, ReasoningContext};

/// Compound task of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Pick a responder and plan its route.
    Dispatch,
    /// Drive to the scene.
    Navigate,
    /// Work the scene.
    Resolve,
    /// Drive back to base.
    Return,
}

/// Primitive task of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveTask {
    /// Reserve the nearest free responder of the right class.
    AssignVehicle,
    /// Route the responder to the scene.
    ComputeRoute,
    /// Check the remaining path for closures.
    MonitorObstacles,
    /// Re-plan the route if an obstacle was found.
    ReRouteIfBlocked,
    /// Wait until the responder reaches the scene.
    FollowPath,
    /// Start work on site.
    Assess,
    /// Treat casualties or fight the fire.
    ProvideAid,
    /// Make the site safe.
    ClearSite,
    /// Route the responder home.
    ComputeReturnRoute,
    /// Wait until the responder is home.
    TravelToBase,
    /// Close out the emergency.
    ReportComplete,
}

impl PrimitiveTask {
    /// Wire name of the task.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AssignVehicle => "assign_vehicle",
            Self::ComputeRoute => "compute_route",
            Self::MonitorObstacles => "monitor_obstacles",
            Self::ReRouteIfBlocked => "re_route_if_blocked",
            Self::FollowPath => "follow_path",
            Self::Assess => "assess",
            Self::ProvideAid => "provide_aid",
            Self::ClearSite => "clear_site",
            Self::ComputeReturnRoute => "compute_return_route",
            Self::TravelToBase => "travel_to_base",
            Self::ReportComplete => "report_complete",
        }
    }
}

/// A compound task and its primitives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundTask {
    /// Which phase this is.
    pub phase: Phase,
    /// Human-readable label.
    pub label: String,
    /// Primitives in execution order.
    pub tasks: Vec<PrimitiveTask>,
}

/// Lifecycle of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Being advanced.
    Active,
    /// Cursor exhausted, emergency resolved.
    Completed,
    /// Emergency withdrawn or plan faulted.
    Abandoned,
}

/// A response plan for one emergency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Identifier.
    pub id: PlanId,
    /// Emergency being answered.
    pub emergency: EmergencyId,
    /// Kind of emergency, which fixes the responder class.
    pub kind: EmergencyKind,
    /// Responder, once assigned.
    pub vehicle: Option<VehicleId>,
    /// The four compound tasks.
    pub phases: Vec<CompoundTask>,
    /// Index of the next primitive in the flattened task list.
    pub cursor: usize,
    /// Lifecycle.
    pub status: PlanStatus,
    /// Failed or pending attempts at the current primitive.
    pub attempts: u32,
    /// Tick at which the plan was created.
    pub created_tick: u64,
    obstacle: bool,
}

impl Plan {
    /// Decompose an emergency into the standard four-phase plan.
    pub fn decompose(id: PlanId, emergency: &Emergency, tick: u64) -> Self {
        let (dispatch, resolve, home) = match emergency.kind {
            EmergencyKind::Accident => (
                "Dispatch Ambulance",
                "Provide Medical Assistance",
                "Return to Hospital",
            ),
            EmergencyKind::Fire => ("Dispatch Fire Truck", "Extinguish Fire", "Return to Fire Station"),
        };
        let compound = |phase, label: &str, tasks: &[PrimitiveTask]| CompoundTask {
            phase,
            label: label.to_owned(),
            tasks: tasks.to_vec(),
        };
        Self {
            id,
            emergency: emergency.id,
            kind: emergency.kind,
            vehicle: None,
            phases: vec![
                compound(
                    Phase::Dispatch,
                    dispatch,
                    &[PrimitiveTask::AssignVehicle, PrimitiveTask::ComputeRoute],
                ),
                compound(
                    Phase::Navigate,
                    "Navigate to Scene",
                    &[
                        PrimitiveTask::MonitorObstacles,
                        PrimitiveTask::ReRouteIfBlocked,
                        PrimitiveTask::FollowPath,
                    ],
                ),
                compound(
                    Phase::Resolve,
                    resolve,
                    &[
                        PrimitiveTask::Assess,
                        PrimitiveTask::ProvideAid,
                        PrimitiveTask::ClearSite,
                    ],
                ),
                compound(
                    Phase::Return,
                    home,
                    &[
                        PrimitiveTask::ComputeReturnRoute,
                        PrimitiveTask::TravelToBase,
                        PrimitiveTask::ReportComplete,
                    ],
                ),
            ],
            cursor: 0,
            status: PlanStatus::Active,
            attempts: 0,
            created_tick: tick,
            obstacle: false,
        }
    }

    /// All primitives in execution order, with their phase.
    pub fn primitives(&self) -> impl Iterator<Item = (Phase, PrimitiveTask)> + '_ {
        self.phases
            .iter()
            .flat_map(|c| c.tasks.iter().map(move |t| (c.phase, *t)))
    }

    /// Number of primitives.
    pub fn len(&self) -> usize {
        self.phases.iter().map(|c| c.tasks.len()).sum()
    }

    /// Whether the plan has no primitives.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The primitive the cursor points at.
    pub fn current(&self) -> Option<(Phase, PrimitiveTask)> {
        self.primitives().nth(self.cursor)
    }

    /// Whether the cursor has run off the end.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.len()
    }

    /// Render the task tree with progress markers: `[x]` done, `[>]`
    /// current, `[ ]` pending.
    pub fn render_tree(&self) -> String {
        let mut lines = vec![format!(
            "{} for {} {} ({:?})",
            self.id, self.kind, self.emergency, self.status
        )];
        let mut index = 0_usize;
        for compound in &self.phases {
            lines.push(format!("  {}", compound.label));
            for task in &compound.tasks {
                let mark = match index.cmp(&self.cursor) {
                    core::cmp::Ordering::Less => "[x]",
                    core::cmp::Ordering::Equal if self.status == PlanStatus::Active => "[>]",
                    _ => "[ ]",
                };
                lines.push(format!("    {mark} {}", task.as_str()));
                index = index.saturating_add(1);
            }
        }
        lines.join("\n")
    }
}

/// Mutable world view delegated to the planner for one tick.
pub struct PlanWorld<'a> {
    /// City grid, read-only.
    pub city: &'a CityMap,
    /// Router for responder paths.
    pub router: &'a mut Router,
    /// The fleet.
    pub vehicles: &'a mut BTreeMap<VehicleId, Vehicle>,
    /// Open emergencies.
    pub emergencies: &'a mut BTreeMap<EmergencyId, Emergency>,
}

/// Result of running one primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StepOutcome {
    Done,
    Pending(String),
}

/// Owns every active plan.
#[derive(Debug, Clone)]
pub struct Planner {
    plans: BTreeMap<EmergencyId, Plan>,
    next_id: PlanId,
    algorithm: Algorithm,
    completed: u64,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new(Algorithm::AStar)
    }
}

impl Planner {
    /// Create a planner that routes responders with `algorithm`.
    pub const fn new(algorithm: Algorithm) -> Self {
        Self {
            plans: BTreeMap::new(),
            next_id: PlanId(1),
            algorithm,
            completed: 0,
        }
    }

    /// Create a plan for a newly reported emergency.
    pub fn create(&mut self, emergency: &Emergency, tick: u64) -> Result<ReasoningContext, EngineError> {
        let id = self.next_id;
        self.next_id = id
            .next()
            .ok_or(EngineError::ArithmeticOverflow(EngineId::Planner))?;
        let plan = Plan::decompose(id, emergency, tick);
        let context = ReasoningContext::new(EngineId::Planner, "plan_created")
            .step(format!(
                "{} {} at {} severity {} decomposed into {} phases, {} primitive tasks",
                emergency.kind,
                emergency.id,
                emergency.pos,
                emergency.severity,
                plan.phases.len(),
                plan.len()
            ))
            .step(plan.render_tree())
            .inputs(json!({ "emergency": emergency.id, "kind": emergency.kind, "pos": emergency.pos }))
            .outputs(json!({ "plan": id, "phases": plan.phases }))
            .confidence(1.0);
        debug!(plan = %id, emergency = %emergency.id, "plan created");
        self.plans.insert(emergency.id, plan);
        Ok(context)
    }

    /// The plan for an emergency, if active.
    pub fn get(&self, emergency: EmergencyId) -> Option<&Plan> {
        self.plans.get(&emergency)
    }

    /// Active plans in emergency-id order.
    pub fn active(&self) -> impl Iterator<Item = &Plan> {
        self.plans.values()
    }

    /// Number of active plans.
    pub fn active_count(&self) -> usize {
        self.plans.len()
    }

    /// Plans completed since the last reset.
    pub const fn completed(&self) -> u64 {
        self.completed
    }

    /// Abandon the plan for a withdrawn emergency and send its responder
    /// home. Returns the explanation, or `None` if no plan was active.
    pub fn cancel(
        &mut self,
        emergency: EmergencyId,
        vehicles: &mut BTreeMap<VehicleId, Vehicle>,
    ) -> Option<ReasoningContext> {
        let mut plan = self.plans.remove(&emergency)?;
        plan.status = PlanStatus::Abandoned;
        release(vehicles, plan.vehicle);
        info!(plan = %plan.id, %emergency, "plan cancelled");
        Some(
            ReasoningContext::new(EngineId::Planner, "plan_abandoned")
                .step(format!("{emergency} withdrawn, abandoning {}", plan.id))
                .step(plan.render_tree())
                .outputs(json!({ "plan": plan.id, "released": plan.vehicle }))
                .confidence(1.0),
        )
    }

    /// Drop every plan.
    pub fn reset(&mut self) {
        self.plans.clear();
        self.next_id = PlanId(1);
        self.completed = 0;
    }

    /// Advance every active plan by one primitive.
    ///
    /// Faults inside a single plan abandon that plan, release its
    /// responder and surface as a critical event; other plans carry on.
    pub fn advance_all(&mut self, world: &mut PlanWorld<'_>, tick: u64) -> EngineOutput {
        let mut out = EngineOutput::new();
        let ids: Vec<EmergencyId> = self.plans.keys().copied().collect();
        for id in ids {
            let Some(mut plan) = self.plans.remove(&id) else {
                continue;
            };
            if !world.emergencies.contains_key(&id) {
                plan.status = PlanStatus::Abandoned;
                release(world.vehicles, plan.vehicle);
                out.reason(
                    ReasoningContext::new(EngineId::Planner, "plan_abandoned")
                        .step(format!("{id} no longer exists, abandoning {}", plan.id))
                        .confidence(1.0),
                );
                continue;
            }
            match advance(&mut plan, world, self.algorithm, tick, &mut out) {
                Ok(()) if plan.status == PlanStatus::Completed => {
                    self.completed = self.completed.saturating_add(1);
                }
                Ok(()) => {
                    self.plans.insert(id, plan);
                }
                Err(e) => {
                    warn!(plan = %plan.id, error = %e, "plan faulted, abandoning");
                    plan.status = PlanStatus::Abandoned;
                    release(world.vehicles, plan.vehicle);
                    out.event(Event::new(
                        tick,
                        EventType::EngineFault,
                        Severity::Critical,
                        format!("Planner fault on {}: {e}", plan.id),
                        json!({ "engine": EngineId::Planner, "plan": plan.id, "error": e.to_string() }),
                    ));
                }
            }
        }
        out
    }
}

/// Free a responder and send it home.
fn release(vehicles: &mut BTreeMap<VehicleId, Vehicle>, vehicle: Option<VehicleId>) {
    let Some(v) = vehicle.and_then(|id| vehicles.get_mut(&id)) else {
        return;
    };
    v.assignment = None;
    v.path.clear();
    match v.home {
        Some(home) if home != v.pos => {
            v.destination = Some(home);
            v.status = VehicleStatus::Returning;
        }
        _ => v.park(),
    }
}

/// Execute the current primitive and move the cursor if it completed.
fn advance(
    plan: &mut Plan,
    world: &mut PlanWorld<'_>,
    algorithm: Algorithm,
    tick: u64,
    out: &mut EngineOutput,
) -> Result<(), EngineError> {
    let Some((phase, task)) = plan.current() else {
        return finish(plan, world, tick, out);
    };
    match execute(plan, task, world, algorithm, tick, out)? {
        StepOutcome::Done => {
            debug!(plan = %plan.id, ?phase, task = task.as_str(), "primitive complete");
            plan.cursor = plan.cursor.saturating_add(1);
            plan.attempts = 0;
            if plan.is_exhausted() {
                finish(plan, world, tick, out)?;
            }
        }
        StepOutcome::Pending(reason) => {
            plan.attempts = plan.attempts.saturating_add(1);
            debug!(plan = %plan.id, task = task.as_str(), attempts = plan.attempts, %reason, "primitive pending");
        }
    }
    Ok(())
}

fn vehicle_mut<'w>(
    plan: &Plan,
    vehicles: &'w mut BTreeMap<VehicleId, Vehicle>,
) -> Result<&'w mut Vehicle, EngineError> {
    let vehicle = plan.vehicle.ok_or_else(|| EngineError::Invariant {
        engine: EngineId::Planner,
        detail: format!("{} has no responder past dispatch", plan.id),
    })?;
    vehicles
        .get_mut(&vehicle)
        .ok_or(EngineError::UnknownVehicle {
            plan: plan.id,
            vehicle,
        })
}

fn emergency_mut<'w>(
    plan: &Plan,
    emergencies: &'w mut BTreeMap<EmergencyId, Emergency>,
) -> Result<&'w mut Emergency, EngineError> {
    emergencies
        .get_mut(&plan.emergency)
        .ok_or(EngineError::UnknownEmergency {
            plan: plan.id,
            emergency: plan.emergency,
        })
}

/// Route the plan's vehicle to `goal`, writing only its path fields.
/// Returns the number of cells in the new path, or `None` if unreachable.
fn route_to(
    plan: &Plan,
    world: &mut PlanWorld<'_>,
    goal: GridPos,
    algorithm: Algorithm,
    moving_status: VehicleStatus,
) -> Result<Option<usize>, EngineError> {
    let start = vehicle_mut(plan, world.vehicles)?.pos;
    let report = world.router.route(world.city, start, goal, algorithm)?;
    let vehicle = vehicle_mut(plan, world.vehicles)?;
    vehicle.destination = Some(goal);
    if let Some(path) = report.path {
        let len = path.len();
        vehicle.path = path.into_iter().skip(1).collect();
        vehicle.status = moving_status;
        Ok(Some(len))
    } else {
        vehicle.path.clear();
        vehicle.status = VehicleStatus::Stuck;
        Ok(None)
    }
}

#[allow(clippy::too_many_lines)]
fn execute(
    plan: &mut Plan,
    task: PrimitiveTask,
    world: &mut PlanWorld<'_>,
    algorithm: Algorithm,
    tick: u64,
    out: &mut EngineOutput,
) -> Result<StepOutcome, EngineError> {
    match task {
        PrimitiveTask::AssignVehicle => {
            if plan.vehicle.is_some() {
                return Ok(StepOutcome::Done);
            }
            let emergency = emergency_mut(plan, world.emergencies)?;
            let scene = emergency.pos;
            let class = plan.kind.responder();
            let chosen = world
                .vehicles
                .values()
                .filter(|v| v.class == class && v.is_available())
                .min_by_key(|v| (v.pos.manhattan(scene), v.id))
                .map(|v| (v.id, v.pos.manhattan(scene)));
            let Some((vehicle_id, distance)) = chosen else {
                return Ok(StepOutcome::Pending(format!("no {class} available")));
            };
            emergency.assign(vehicle_id)?;
            let vehicle = world
                .vehicles
                .get_mut(&vehicle_id)
                .ok_or(EngineError::UnknownVehicle {
                    plan: plan.id,
                    vehicle: vehicle_id,
                })?;
            vehicle.assignment = Some(plan.emergency);
            plan.vehicle = Some(vehicle_id);
            info!(plan = %plan.id, emergency = %plan.emergency, vehicle = %vehicle_id, distance, "responder assigned");
            out.event(Event::new(
                tick,
                EventType::EmergencyAssigned,
                Severity::Info,
                format!("{class} {vehicle_id} assigned to {} {}", plan.kind, plan.emergency),
                json!({ "emergency": plan.emergency, "vehicle": vehicle_id, "distance": distance }),
            ));
            out.reason(
                ReasoningContext::new(EngineId::Planner, "assign_vehicle")
                    .step(format!("{} needs a {class}", plan.emergency))
                    .step(format!("nearest free {class} is {vehicle_id}, {distance} cells away"))
                    .confidence(1.0),
            );
            Ok(StepOutcome::Done)
        }

        PrimitiveTask::ComputeRoute => {
            let scene = emergency_mut(plan, world.emergencies)?.pos;
            match route_to(plan, world, scene, algorithm, VehicleStatus::Moving)? {
                Some(len) => {
                    emergency_mut(plan, world.emergencies)?.advance_to(EmergencyState::EnRoute)?;
                    out.reason(
                        ReasoningContext::new(EngineId::Routing, "route_to_scene")
                            .step(format!("{algorithm} found a {len}-cell path to {scene}"))
                            .confidence(1.0),
                    );
                    Ok(StepOutcome::Done)
                }
                None => Ok(stuck(plan, world, scene, tick, out)),
            }
        }

        PrimitiveTask::MonitorObstacles => {
            let scene = emergency_mut(plan, world.emergencies)?.pos;
            let vehicle = vehicle_mut(plan, world.vehicles)?;
            let blocked = vehicle.path.iter().any(|p| world.city.is_blocked(*p));
            plan.obstacle = blocked || (vehicle.path.is_empty() && vehicle.pos != scene);
            Ok(StepOutcome::Done)
        }

        PrimitiveTask::ReRouteIfBlocked => {
            if !plan.obstacle {
                return Ok(StepOutcome::Done);
            }
            let scene = emergency_mut(plan, world.emergencies)?.pos;
            match route_to(plan, world, scene, algorithm, VehicleStatus::Moving)? {
                Some(len) => {
                    plan.obstacle = false;
                    out.reason(
                        ReasoningContext::new(EngineId::Routing, "reroute")
                            .step(format!("obstacle on the way to {scene}"))
                            .step(format!("{algorithm} found a {len}-cell detour"))
                            .confidence(0.9),
                    );
                    Ok(StepOutcome::Done)
                }
                None => Ok(stuck(plan, world, scene, tick, out)),
            }
        }

        PrimitiveTask::FollowPath => {
            let scene = emergency_mut(plan, world.emergencies)?.pos;
            travel(plan, world, scene, algorithm, VehicleStatus::Moving, tick, out)
        }

        PrimitiveTask::Assess => {
            let emergency = emergency_mut(plan, world.emergencies)?;
            emergency.advance_to(EmergencyState::Resolving)?;
            let severity = emergency.severity;
            let vehicle = vehicle_mut(plan, world.vehicles)?;
            vehicle.destination = None;
            vehicle.path.clear();
            vehicle.status = VehicleStatus::Idle;
            out.reason(
                ReasoningContext::new(EngineId::Planner, "assess_scene")
                    .step(format!("{} on site at {}", vehicle.id, vehicle.pos))
                    .step(format!("{} severity {severity}/10", plan.kind))
                    .confidence(0.9),
            );
            Ok(StepOutcome::Done)
        }

        PrimitiveTask::ProvideAid | PrimitiveTask::ClearSite => Ok(StepOutcome::Done),

        PrimitiveTask::ComputeReturnRoute => {
            let vehicle = vehicle_mut(plan, world.vehicles)?;
            let home = vehicle.home.unwrap_or(vehicle.pos);
            match route_to(plan, world, home, algorithm, VehicleStatus::Returning)? {
                Some(_) => Ok(StepOutcome::Done),
                None => Ok(stuck(plan, world, home, tick, out)),
            }
        }

        PrimitiveTask::TravelToBase => {
            let vehicle = vehicle_mut(plan, world.vehicles)?;
            let home = vehicle.home.unwrap_or(vehicle.pos);
            travel(plan, world, home, algorithm, VehicleStatus::Returning, tick, out)
        }

        PrimitiveTask::ReportComplete => Ok(StepOutcome::Done),
    }
}

/// Wait for the vehicle to reach `goal`, re-routing if its path was lost.
fn travel(
    plan: &Plan,
    world: &mut PlanWorld<'_>,
    goal: GridPos,
    algorithm: Algorithm,
    moving_status: VehicleStatus,
    tick: u64,
    out: &mut EngineOutput,
) -> Result<StepOutcome, EngineError> {
    let vehicle = vehicle_mut(plan, world.vehicles)?;
    if vehicle.pos == goal {
        return Ok(StepOutcome::Done);
    }
    if !vehicle.path.is_empty() {
        return Ok(StepOutcome::Pending(format!("{} en route to {goal}", vehicle.id)));
    }
    match route_to(plan, world, goal, algorithm, moving_status)? {
        Some(_) => Ok(StepOutcome::Pending(String::from("re-routed"))),
        None => Ok(stuck(plan, world, goal, tick, out)),
    }
}

/// Record a routing failure. Only the first failure per primitive emits
/// an event; later retries are silent.
fn stuck(
    plan: &Plan,
    world: &PlanWorld<'_>,
    goal: GridPos,
    tick: u64,
    out: &mut EngineOutput,
) -> StepOutcome {
    let from = plan
        .vehicle
        .and_then(|id| world.vehicles.get(&id))
        .map(|v| v.pos);
    if plan.attempts == 0 {
        out.event(Event::new(
            tick,
            EventType::VehicleStuck,
            Severity::Warning,
            format!(
                "Responder for {} has no path to {goal}, will retry",
                plan.emergency
            ),
            json!({ "plan": plan.id, "vehicle": plan.vehicle, "from": from, "goal": goal }),
        ));
    }
    StepOutcome::Pending(format!("no path to {goal}"))
}

/// Resolve the emergency and release the responder.
fn finish(
    plan: &mut Plan,
    world: &mut PlanWorld<'_>,
    tick: u64,
    out: &mut EngineOutput,
) -> Result<(), EngineError> {
    let emergency = emergency_mut(plan, world.emergencies)?;
    emergency.advance_to(EmergencyState::Resolved)?;
    let age = tick.saturating_sub(emergency.reported_tick);
    let vehicle = vehicle_mut(plan, world.vehicles)?;
    vehicle.assignment = None;
    vehicle.park();
    plan.status = PlanStatus::Completed;
    info!(plan = %plan.id, emergency = %plan.emergency, ticks = age, "emergency resolved");
    out.event(Event::new(
        tick,
        EventType::EmergencyResolved,
        Severity::Info,
        format!("{} {} resolved after {age} ticks", plan.kind, plan.emergency),
        json!({ "emergency": plan.emergency, "plan": plan.id, "vehicle": plan.vehicle, "ticks": age }),
    ));
    out.reason(
        ReasoningContext::new(EngineId::Planner, "plan_complete")
            .step(format!("all {} primitive tasks done", plan.len()))
            .step(plan.render_tree())
            .confidence(1.0),
    );
    Ok(())
}
