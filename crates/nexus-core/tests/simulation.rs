//! End-to-end tests for the orchestrator and tick cycle.
//!
//! These drive a full [`Simulation`] (or the raw tick function over a
//! hand-built world) and check the properties that must hold on every
//! tick, not just individual engine outputs.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use std::collections::BTreeMap;

use nexus_core::{CityState, Engines, Simulation, SimulationConfig, run_tick};
use nexus_types::{
    EmergencyId, EmergencyState, EngineId, EventType, GridPos, Notification, SimulationPhase,
    Vehicle, VehicleClass, VehicleId,
};
use nexus_world::CityMap;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn config(accident_rate: f64, fire_rate: f64) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.probability.accident_base_rate = accident_rate;
    config.probability.fire_base_rate = fire_rate;
    config
}

fn positions(sim: &Simulation) -> Vec<(VehicleId, GridPos)> {
    sim.vehicles()
        .unwrap()
        .into_iter()
        .map(|v| (v.id, v.pos))
        .collect()
}

#[test]
fn tick_increases_by_one_while_running_and_holds_while_paused() {
    let mut sim = Simulation::new(config(0.02, 0.01)).unwrap();
    sim.start();
    let mut last = sim.status().tick;
    for _ in 0..50 {
        let summary = sim.tick().unwrap();
        assert_eq!(summary.tick, last + 1);
        last = summary.tick;
    }
    sim.pause();
    for _ in 0..10 {
        assert!(sim.tick().is_none());
        assert_eq!(sim.status().tick, last);
    }
}

#[test]
fn power_invariants_hold_every_tick() {
    let mut cfg = config(0.05, 0.02);
    cfg.power.reallocation_interval_ticks = 5;
    let capacity = u64::from(cfg.power.total_capacity);
    let mut sim = Simulation::new(cfg).unwrap();
    sim.start();
    for _ in 0..100 {
        sim.tick();
        let buildings = sim.buildings().unwrap();
        let total: u64 = buildings.iter().map(|b| u64::from(b.allocated_power)).sum();
        assert!(total <= capacity);
        assert!(buildings.iter().all(|b| b.allocated_power <= b.power_requirement));
    }
}

#[test]
fn emergency_lifecycle_only_moves_forward() {
    let mut sim = Simulation::new(config(0.3, 0.1)).unwrap();
    sim.start();
    let mut seen: BTreeMap<EmergencyId, EmergencyState> = BTreeMap::new();
    for _ in 0..400 {
        sim.tick();
        let snapshot = sim.city_state().unwrap();
        for e in &snapshot.emergencies {
            if let Some(prev) = seen.get(&e.id) {
                assert!(e.state >= *prev, "{} went from {prev:?} to {:?}", e.id, e.state);
            }
            if e.state >= EmergencyState::Assigned {
                assert!(e.assigned_vehicle.is_some());
            }
            seen.insert(e.id, e.state);
        }
        let mut assigned: Vec<EmergencyId> =
            snapshot.vehicles.iter().filter_map(|v| v.assignment).collect();
        let before = assigned.len();
        assigned.sort();
        assigned.dedup();
        assert_eq!(assigned.len(), before, "one responder per emergency");
    }
    assert!(!seen.is_empty());
    let metrics = sim.metrics().unwrap();
    assert!(metrics.resolved_emergencies > 0);
    assert!((0.0..=100.0).contains(&metrics.efficiency_score));
}

#[test]
fn seeded_runs_are_reproducible() {
    let run = || {
        let mut sim = Simulation::new(config(0.05, 0.02)).unwrap();
        sim.start();
        for _ in 0..120 {
            sim.tick();
        }
        let snapshot = sim.city_state().unwrap();
        (
            positions(&sim),
            snapshot.emergencies.iter().map(|e| (e.id, e.pos, e.state)).collect::<Vec<_>>(),
        )
    };
    assert_eq!(run(), run());
}

#[test]
fn restart_replays_the_same_world() {
    let mut sim = Simulation::new(config(0.05, 0.02)).unwrap();
    sim.start();
    for _ in 0..60 {
        sim.tick();
    }
    let first = positions(&sim);

    let status = sim.restart().unwrap();
    assert_eq!(status.tick, 0);
    assert_eq!(status.state, SimulationPhase::Running);
    assert!(sim.reasoning(usize::MAX, None).is_empty());
    for _ in 0..60 {
        sim.tick();
    }
    assert_eq!(positions(&sim), first);
}

#[test]
fn restart_clears_emergencies_closures_and_histories() {
    let mut sim = Simulation::new(config(0.5, 0.2)).unwrap();
    sim.start();
    for _ in 0..30 {
        sim.tick();
        if !sim.city_state().unwrap().emergencies.is_empty() {
            break;
        }
    }
    let road = sim.vehicles().unwrap()[0].pos;
    sim.block_road(road, None).unwrap();
    let before = sim.city_state().unwrap();
    assert!(!before.emergencies.is_empty());
    assert_eq!(before.blocked_roads.len(), 1);
    assert!(sim.events(usize::MAX).len() > 1);
    assert!(!sim.reasoning(usize::MAX, None).is_empty());

    let status = sim.restart().unwrap();
    assert_eq!(status.tick, 0);
    assert_eq!(status.state, SimulationPhase::Running);
    let after = sim.city_state().unwrap();
    assert!(after.emergencies.is_empty());
    assert!(after.blocked_roads.is_empty());
    assert_eq!(after.vehicles.len(), before.vehicles.len());
    assert_eq!(after.buildings.len(), before.buildings.len());
    let events = sim.events(usize::MAX);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::SimulationRestarted);
    assert!(sim.reasoning(usize::MAX, None).is_empty());
    let metrics = sim.metrics().unwrap();
    assert_eq!(metrics.total_emergencies, 0);
    assert_eq!(metrics.resolved_emergencies, 0);
}

#[test]
fn cancel_emergency_releases_responder() {
    let mut sim = Simulation::new(config(0.5, 0.0)).unwrap();
    sim.start();
    let mut target = None;
    for _ in 0..100 {
        sim.tick();
        let snapshot = sim.city_state().unwrap();
        target = snapshot
            .emergencies
            .iter()
            .find(|e| e.assigned_vehicle.is_some() && !e.is_resolved())
            .map(|e| (e.id, e.assigned_vehicle));
        if target.is_some() {
            break;
        }
    }
    let (id, vehicle) = target.unwrap();
    let vehicle = vehicle.unwrap();

    sim.cancel_emergency(id).unwrap();
    let snapshot = sim.city_state().unwrap();
    assert!(snapshot.emergencies.iter().all(|e| e.id != id));
    let responder = snapshot.vehicles.iter().find(|v| v.id == vehicle).unwrap();
    assert_eq!(responder.assignment, None);
    assert!(sim
        .events(5)
        .iter()
        .any(|e| e.event_type == EventType::EmergencyCancelled));
    assert_eq!(sim.reasoning(1, Some(EngineId::Planner))[0].decision, "plan_abandoned");
    assert!(sim.cancel_emergency(id).is_err());
}

#[test]
fn subscribers_see_connection_then_tick_traffic() {
    let mut sim = Simulation::new(config(0.0, 0.0)).unwrap();
    let mut sub = sim.subscribe();
    sim.start();
    sim.tick();

    assert!(matches!(sub.try_recv(), Some(Notification::Connection(c)) if c.connected));
    let mut kinds = Vec::new();
    while let Some(n) = sub.try_recv() {
        kinds.push(match n {
            Notification::Event(e) => format!("event:{}", serde_json::to_value(e.event_type).unwrap()),
            Notification::Reasoning(_) => String::from("reasoning"),
            Notification::StateUpdate(s) => format!("state:{}", s.tick),
            Notification::Connection(_) => String::from("connection"),
            Notification::Pong(_) => String::from("pong"),
        });
    }
    assert_eq!(kinds.first().map(String::as_str), Some("event:\"simulation_started\""));
    assert_eq!(kinds.last().map(String::as_str), Some("state:1"));
    assert_eq!(sub.dropped(), 0);
}

#[test]
fn engine_fault_is_isolated() {
    let mut cfg = config(0.0, 0.0);
    cfg.power.reallocation_interval_ticks = 1;
    let city = CityMap::new(5).unwrap();
    let mut lost = Vehicle::new(VehicleId(1), VehicleClass::Normal, GridPos::new(0, 0), 50.0, 80.0);
    lost.destination = Some(GridPos::new(40, 40));
    let mut state = CityState::from_parts(city, vec![lost], StdRng::seed_from_u64(1));
    let mut engines = Engines::from_config(&cfg);

    let out = run_tick(&mut state, &mut engines, &cfg);
    assert_eq!(out.summary.tick, 1);
    assert_eq!(out.summary.faults, vec![EngineId::Routing]);
    assert!(out.summary.reallocated);
    let fault = out
        .events
        .iter()
        .find(|e| e.event_type == EventType::EngineFault)
        .unwrap();
    assert_eq!(fault.severity, nexus_types::Severity::Critical);

    let next = run_tick(&mut state, &mut engines, &cfg);
    assert_eq!(next.summary.tick, 2);
}
