use carbus::vehicle::store::{Control, Light, TurnSignal, VehicleCommand};
use carbus::vehicle::*;

fn running_in(selector: GearSelector) -> VehicleStore {
    let mut store = VehicleStore::new();
    store.apply(VehicleCommand::SetIgnition { mode: Ignition::On });
    store.apply(VehicleCommand::StartEngine);
    store.apply(VehicleCommand::SetGearSelector { gear: selector });
    store
}

#[test]
fn test_start_transition_completes_engine_start() {
    let mut store = VehicleStore::new();

    let effect = store.apply(VehicleCommand::SetIgnition {
        mode: Ignition::Start,
    });
    let CommandEffect::ScheduleEngineStart(token) = effect else {
        panic!("START must schedule an engine start, got {:?}", effect);
    };

    // Cranking: key held in START, engine not yet running
    assert_eq!(store.state().ignition, Ignition::Start);
    assert!(!store.state().engine_running);
    assert!(store.state().check_engine_lamp());

    assert!(store.complete_engine_start(token));
    let state = store.state();
    assert!(state.engine_running);
    assert_eq!(state.rpm, 800.0);
    assert_eq!(state.ignition, Ignition::On);
    assert!(!state.check_engine_lamp());
    assert_eq!(store.stats().engine_starts, 1);
}

#[test]
fn test_leaving_start_cancels_pending_start() {
    let mut store = VehicleStore::new();
    let CommandEffect::ScheduleEngineStart(token) = store.apply(VehicleCommand::SetIgnition {
        mode: Ignition::Start,
    }) else {
        panic!("START must schedule an engine start");
    };

    store.apply(VehicleCommand::SetIgnition { mode: Ignition::Off });
    assert!(store.pending_engine_start().is_none());
    assert!(!store.complete_engine_start(token));
    assert!(!store.state().engine_running);
    assert_eq!(store.state().ignition, Ignition::Off);
}

#[test]
fn test_ignition_off_is_a_full_stop() {
    let mut store = running_in(GearSelector::D);
    store.apply(VehicleCommand::ApplyDynamicsTick(DynamicsUpdate {
        rpm: 3000.0,
        speed_kmh: 40.0,
        active_gear: 2,
    }));
    assert_eq!(store.state().speed_kmh, 40.0);

    store.apply(VehicleCommand::SetIgnition { mode: Ignition::Off });
    let state = store.state();
    assert!(!state.engine_running);
    assert_eq!(state.rpm, 0.0);
    assert_eq!(state.speed_kmh, 0.0);
}

#[test]
fn test_accessory_position_stops_running_engine() {
    let mut store = running_in(GearSelector::D);
    store.apply(VehicleCommand::ApplyDynamicsTick(DynamicsUpdate {
        rpm: 3000.0,
        speed_kmh: 40.0,
        active_gear: 2,
    }));

    store.apply(VehicleCommand::SetIgnition { mode: Ignition::Acc });
    let state = store.state();
    assert!(!state.engine_running);
    assert_eq!(state.ignition, Ignition::Acc);
    // Only OFF is a full stop; ACC keeps the last rpm and speed
    assert_eq!(state.rpm, 3000.0);
    assert_eq!(state.speed_kmh, 40.0);
    assert_eq!(state.check_invariants(), Ok(()));
}

#[test]
fn test_accessory_position_freezes_dynamics() {
    let mut store = running_in(GearSelector::D);
    store.apply(VehicleCommand::ApplyDynamicsTick(DynamicsUpdate {
        rpm: 3000.0,
        speed_kmh: 40.0,
        active_gear: 2,
    }));
    store.apply(VehicleCommand::SetIgnition { mode: Ignition::Acc });

    let mut simulator = DynamicsSimulator::new();
    assert!(simulator.step(store.state()).is_none());
    assert_eq!(
        store.apply(VehicleCommand::ApplyDynamicsTick(DynamicsUpdate {
            rpm: 2000.0,
            speed_kmh: 30.0,
            active_gear: 2,
        })),
        CommandEffect::Ignored
    );
    assert_eq!(store.state().speed_kmh, 40.0);
}

#[test]
fn test_start_engine_requires_ignition() {
    let mut store = VehicleStore::new();
    assert_eq!(store.apply(VehicleCommand::StartEngine), CommandEffect::Ignored);
    assert!(!store.state().engine_running);

    store.apply(VehicleCommand::SetIgnition { mode: Ignition::On });
    assert_eq!(store.apply(VehicleCommand::StartEngine), CommandEffect::Applied);
    assert!(store.state().engine_running);
    assert_eq!(store.state().rpm, 800.0);
}

#[test]
fn test_stop_engine_zeroes_rpm_and_speed() {
    let mut store = running_in(GearSelector::D);
    store.apply(VehicleCommand::ApplyDynamicsTick(DynamicsUpdate {
        rpm: 2500.0,
        speed_kmh: 25.0,
        active_gear: 1,
    }));
    store.apply(VehicleCommand::StopEngine);

    let state = store.state();
    assert!(!state.engine_running);
    assert_eq!(state.rpm, 0.0);
    assert_eq!(state.speed_kmh, 0.0);
    // Key stays where it was
    assert_eq!(state.ignition, Ignition::On);
}

#[test]
fn test_gear_selection_resets_active_gear() {
    let mut store = running_in(GearSelector::D);
    store.apply(VehicleCommand::ApplyDynamicsTick(DynamicsUpdate {
        rpm: 3000.0,
        speed_kmh: 60.0,
        active_gear: 4,
    }));
    assert_eq!(store.state().active_gear, 4);

    for gear in [GearSelector::N, GearSelector::D, GearSelector::R, GearSelector::P] {
        store.apply(VehicleCommand::SetGearSelector { gear });
        assert_eq!(store.state().gear_selector, gear);
        assert_eq!(store.state().active_gear, 1);
    }
}

#[test]
fn test_engaging_drive_floors_rpm_at_idle() {
    let mut store = running_in(GearSelector::N);
    store.apply(VehicleCommand::ApplyDynamicsTick(DynamicsUpdate {
        rpm: 500.0,
        speed_kmh: 0.0,
        active_gear: 1,
    }));
    assert_eq!(store.state().rpm, 500.0);

    store.apply(VehicleCommand::SetGearSelector {
        gear: GearSelector::D,
    });
    assert_eq!(store.state().rpm, 800.0);
}

#[test]
fn test_pedals_are_clamped() {
    let mut store = VehicleStore::new();
    store.apply(VehicleCommand::SetControl {
        control: Control::Accelerator,
        value: 150,
    });
    store.apply(VehicleCommand::SetControl {
        control: Control::Brake,
        value: -20,
    });
    assert_eq!(store.state().accelerator, 100);
    assert_eq!(store.state().brake, 0);
}

#[test]
fn test_simulation_speed_is_clamped() {
    let mut store = VehicleStore::new();
    store.apply(VehicleCommand::SetSimulationSpeed { factor: 5.0 });
    assert_eq!(store.state().simulation_speed, 2.0);
    store.apply(VehicleCommand::SetSimulationSpeed { factor: 0.0 });
    assert_eq!(store.state().simulation_speed, 0.1);
    store.apply(VehicleCommand::SetSimulationSpeed { factor: 1.5 });
    assert_eq!(store.state().simulation_speed, 1.5);
}

#[test]
fn test_turn_signal_toggles_and_excludes() {
    let mut store = VehicleStore::new();

    store.apply(VehicleCommand::SetTurnSignal {
        signal: TurnSignal::Left,
    });
    assert!(store.state().lights.left_turn);

    store.apply(VehicleCommand::SetTurnSignal {
        signal: TurnSignal::Left,
    });
    let lights = store.state().lights;
    assert!(!lights.left_turn);
    assert!(!lights.right_turn);
    assert!(!lights.hazards);

    store.apply(VehicleCommand::SetTurnSignal {
        signal: TurnSignal::Right,
    });
    store.apply(VehicleCommand::SetTurnSignal {
        signal: TurnSignal::Hazards,
    });
    let lights = store.state().lights;
    assert!(lights.hazards);
    assert!(!lights.right_turn);

    store.apply(VehicleCommand::SetTurnSignal {
        signal: TurnSignal::Left,
    });
    let lights = store.state().lights;
    assert!(lights.left_turn);
    assert!(!lights.hazards);

    store.apply(VehicleCommand::SetTurnSignal {
        signal: TurnSignal::Off,
    });
    assert_eq!(store.state().lights, Lights::default());
}

#[test]
fn test_lights_doors_and_infotainment() {
    let mut store = VehicleStore::new();
    store.apply(VehicleCommand::ToggleLight {
        light: Light::HighBeams,
    });
    store.apply(VehicleCommand::ToggleDoor {
        door: DoorPosition::Rl,
    });
    store.apply(VehicleCommand::SetInfotainment {
        volume: Some(99),
        source: None,
    });
    store.apply(VehicleCommand::SetInfotainment {
        volume: None,
        source: Some(AudioSource::Bt),
    });

    let state = store.state();
    assert!(state.lights.high_beams);
    assert!(!state.lights.headlights);
    assert!(state.doors.rl);
    assert_eq!(state.infotainment.volume, 30);
    assert_eq!(state.infotainment.source, AudioSource::Bt);
}

#[test]
fn test_dynamics_tick_ignored_once_engine_stops() {
    let mut store = running_in(GearSelector::D);
    store.apply(VehicleCommand::StopEngine);

    let effect = store.apply(VehicleCommand::ApplyDynamicsTick(DynamicsUpdate {
        rpm: 2000.0,
        speed_kmh: 10.0,
        active_gear: 1,
    }));
    assert_eq!(effect, CommandEffect::Ignored);
    assert_eq!(store.state().speed_kmh, 0.0);
}

#[test]
fn test_dynamics_tick_values_are_normalized() {
    let mut store = running_in(GearSelector::D);
    store.apply(VehicleCommand::ApplyDynamicsTick(DynamicsUpdate {
        rpm: 9000.0,
        speed_kmh: -5.0,
        active_gear: 9,
    }));
    let state = store.state();
    assert_eq!(state.rpm, 7000.0);
    assert_eq!(state.speed_kmh, 0.0);
    assert_eq!(state.active_gear, 6);
}

#[test]
fn test_unknown_command_from_json_is_a_no_op() {
    let command: VehicleCommand =
        serde_json::from_str(r#"{"command":"deploy_parachute","force":true}"#).unwrap();
    assert_eq!(command, VehicleCommand::Unknown);

    let mut store = VehicleStore::new();
    let before = store.state().clone();
    assert_eq!(store.apply(command), CommandEffect::Ignored);
    assert_eq!(store.state(), &before);
}

#[test]
fn test_internal_tick_is_not_accepted_from_json() {
    let result = serde_json::from_str::<VehicleCommand>(
        r#"{"command":"apply_dynamics_tick","rpm":1000.0,"speed_kmh":1.0,"active_gear":1}"#,
    );
    assert!(!matches!(result, Ok(VehicleCommand::ApplyDynamicsTick(_))));
}

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn ignition() -> impl Strategy<Value = Ignition> {
        prop_oneof![
            Just(Ignition::Off),
            Just(Ignition::Acc),
            Just(Ignition::On),
            Just(Ignition::Start),
        ]
    }

    fn gear_selector() -> impl Strategy<Value = GearSelector> {
        prop_oneof![
            Just(GearSelector::P),
            Just(GearSelector::R),
            Just(GearSelector::N),
            Just(GearSelector::D),
        ]
    }

    fn command() -> impl Strategy<Value = VehicleCommand> {
        prop_oneof![
            ignition().prop_map(|mode| VehicleCommand::SetIgnition { mode }),
            prop_oneof![
                Just(VehicleCommand::StartEngine),
                Just(VehicleCommand::StopEngine),
                Just(VehicleCommand::Unknown),
            ],
            gear_selector().prop_map(|gear| VehicleCommand::SetGearSelector { gear }),
            (-50i32..200).prop_map(|value| VehicleCommand::SetControl {
                control: Control::Accelerator,
                value,
            }),
            (-50i32..200).prop_map(|value| VehicleCommand::SetControl {
                control: Control::Brake,
                value,
            }),
            prop_oneof![
                Just(TurnSignal::Left),
                Just(TurnSignal::Right),
                Just(TurnSignal::Hazards),
                Just(TurnSignal::Off),
            ]
            .prop_map(|signal| VehicleCommand::SetTurnSignal { signal }),
            (-1.0f64..5.0).prop_map(|factor| VehicleCommand::SetSimulationSpeed { factor }),
            (-10i32..50).prop_map(|volume| VehicleCommand::SetInfotainment {
                volume: Some(volume),
                source: None,
            }),
            (0.0f64..12_000.0, -20.0f64..400.0, 0u8..10).prop_map(
                |(rpm, speed_kmh, active_gear)| {
                    VehicleCommand::ApplyDynamicsTick(DynamicsUpdate {
                        rpm,
                        speed_kmh,
                        active_gear,
                    })
                }
            ),
        ]
    }

    proptest! {
        #[test]
        fn invariants_hold_after_every_command(
            commands in prop::collection::vec((command(), any::<bool>()), 1..60)
        ) {
            let mut store = VehicleStore::new();
            let mut simulator = DynamicsSimulator::new();

            for (command, finish_start) in commands {
                let effect = store.apply(command);
                prop_assert_eq!(store.state().check_invariants(), Ok(()));

                if let (CommandEffect::ScheduleEngineStart(token), true) = (effect, finish_start) {
                    store.complete_engine_start(token);
                    prop_assert_eq!(store.state().check_invariants(), Ok(()));
                }

                if let Some(update) = simulator.step(store.state()) {
                    store.apply(VehicleCommand::ApplyDynamicsTick(update));
                    prop_assert_eq!(store.state().check_invariants(), Ok(()));
                }
            }
        }

        #[test]
        fn gear_selection_always_resets_active_gear(
            gear in gear_selector(),
            prior in 1u8..=6
        ) {
            let mut store = running_in(GearSelector::D);
            store.apply(VehicleCommand::ApplyDynamicsTick(DynamicsUpdate {
                rpm: 2000.0,
                speed_kmh: 30.0,
                active_gear: prior,
            }));
            store.apply(VehicleCommand::SetGearSelector { gear });
            prop_assert_eq!(store.state().active_gear, 1);
        }
    }
}
