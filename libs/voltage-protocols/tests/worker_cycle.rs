//! Worker cycles against an in-memory slave

#![allow(clippy::disallowed_methods)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::MemorySlave;
use voltage_channel::Channel;
use voltage_protocols::modbus::{
    Bridge, CoilElement, Converter, DummyElement, ModbusElement, ModbusProtocol, ModbusRequest, Priority,
    SignedDoublewordElement, Task, UnsignedWordElement, WorkerSettings,
};

fn bridge(slave: &Arc<MemorySlave>, settings: WorkerSettings) -> Bridge {
    Bridge::with_transport("modbus0", slave.clone(), settings)
}

fn settings() -> WorkerSettings {
    WorkerSettings {
        cycle_time: Duration::from_secs(1),
        ..WorkerSettings::default()
    }
}

async fn cycle(bridge: &Bridge) {
    bridge.before_process_image().await;
    bridge.execute_write().await;
}

fn read_task(address: u16, priority: Priority) -> Task {
    Task::fc3_read_holding_registers(address, priority, vec![DummyElement::registers(address, 1).boxed()]).unwrap()
}

fn read_addresses(slave: &MemorySlave) -> Vec<u16> {
    slave
        .requests()
        .into_iter()
        .filter_map(|(_, request)| match request {
            ModbusRequest::ReadHoldingRegisters { address, .. } => Some(address),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_low_priority_tasks_take_turns() {
    let slave = Arc::new(MemorySlave::new());
    let bridge = bridge(&slave, settings());
    let protocol = ModbusProtocol::new(1);
    protocol.add_task(read_task(0, Priority::High));
    protocol.add_task(read_task(10, Priority::Low));
    protocol.add_task(read_task(20, Priority::Low));
    protocol.add_task(read_task(30, Priority::Low));
    bridge.add_protocol("meter0", Arc::new(protocol));

    for _ in 0..3 {
        cycle(&bridge).await;
    }

    assert_eq!(read_addresses(&slave), vec![0, 10, 0, 20, 0, 30]);
}

#[tokio::test]
async fn test_once_task_runs_until_success() {
    let slave = Arc::new(MemorySlave::new());
    slave.set_register(9000, 0x0102);
    let bridge = bridge(&slave, settings());

    let firmware: Channel<u16> = Channel::new("meter0", "FirmwareVersion");
    let protocol = ModbusProtocol::new(1);
    protocol.add_task(
        Task::fc3_read_holding_registers(
            9000,
            Priority::Once,
            vec![UnsignedWordElement::new(9000)
                .bind(&firmware, Converter::identity())
                .boxed()],
        )
        .unwrap(),
    );
    let protocol = Arc::new(protocol);
    bridge.add_protocol("meter0", Arc::clone(&protocol));

    slave.set_offline(true);
    cycle(&bridge).await;
    assert_eq!(firmware.value(), None);
    assert_eq!(protocol.read_task_count(), 1);

    slave.set_offline(false);
    cycle(&bridge).await;
    assert_eq!(firmware.value(), Some(0x0102));
    assert_eq!(protocol.read_task_count(), 0);

    slave.clear_requests();
    cycle(&bridge).await;
    assert!(slave.requests().is_empty());
}

#[tokio::test]
async fn test_values_invalidated_after_consecutive_failures() {
    let slave = Arc::new(MemorySlave::new());
    slave.set_register(0, 230);
    let bridge = bridge(
        &slave,
        WorkerSettings {
            invalidate_elements_after_read_errors: 2,
            ..settings()
        },
    );

    let voltage: Channel<u16> = Channel::new("meter0", "Voltage");
    let protocol = ModbusProtocol::new(1);
    protocol.add_task(
        Task::fc3_read_holding_registers(
            0,
            Priority::High,
            vec![UnsignedWordElement::new(0).bind(&voltage, Converter::identity()).boxed()],
        )
        .unwrap(),
    );
    bridge.add_protocol("meter0", Arc::new(protocol));

    cycle(&bridge).await;
    assert_eq!(voltage.value(), Some(230));

    slave.set_offline(true);
    cycle(&bridge).await;
    assert_eq!(voltage.value(), Some(230));
    assert_eq!(bridge.worker().diagnostics().communication_failed.value(), Some(true));

    cycle(&bridge).await;
    assert_eq!(voltage.value(), None);
    assert_eq!(bridge.worker().diagnostics().read_failures.value(), Some(2));

    slave.set_offline(false);
    cycle(&bridge).await;
    assert_eq!(voltage.value(), Some(230));
    assert_eq!(bridge.worker().diagnostics().communication_failed.value(), Some(false));
}

#[tokio::test]
async fn test_scaled_read_and_write() {
    let slave = Arc::new(MemorySlave::new());
    slave.set_register(100, 4370);
    let bridge = bridge(&slave, settings());

    let frequency: Channel<f64> = Channel::builder("meter0", "Frequency").unit("Hz").build();
    let set_frequency: Channel<f64> = Channel::builder("meter0", "SetFrequency")
        .unit("Hz")
        .writable()
        .build();

    let protocol = ModbusProtocol::with_tasks(
        1,
        [
            Task::fc3_read_holding_registers(
                100,
                Priority::High,
                vec![UnsignedWordElement::new(100)
                    .bind(&frequency, Converter::scale_pow10(-2))
                    .boxed()],
            ),
            Task::fc16_write_registers(
                200,
                Priority::High,
                vec![UnsignedWordElement::new(200)
                    .bind(&set_frequency, Converter::scale_pow10(-2))
                    .boxed()],
            ),
        ],
    )
    .unwrap();
    bridge.add_protocol("meter0", Arc::new(protocol));

    bridge.before_process_image().await;
    assert_eq!(frequency.value(), Some(43.7));

    // control window
    set_frequency.push_write(40.0).unwrap();
    bridge.execute_write().await;

    assert_eq!(slave.register(200), 4000);
    assert_eq!(set_frequency.write_shadow_copy(), None);
}

#[tokio::test]
async fn test_nothing_pending_nothing_sent() {
    let slave = Arc::new(MemorySlave::new());
    let bridge = bridge(&slave, settings());

    let set_power: Channel<i32> = Channel::builder("ess0", "SetActivePower")
        .unit("W")
        .writable()
        .build();
    let protocol = ModbusProtocol::with_tasks(
        1,
        [Task::fc16_write_registers(
            500,
            Priority::High,
            vec![SignedDoublewordElement::new(500)
                .bind(&set_power, Converter::identity())
                .boxed()],
        )],
    )
    .unwrap();
    bridge.add_protocol("ess0", Arc::new(protocol));

    cycle(&bridge).await;
    assert!(slave.requests().is_empty());

    set_power.push_write(-1500).unwrap();
    cycle(&bridge).await;
    assert_eq!(
        slave.requests(),
        vec![(
            1,
            ModbusRequest::WriteMultipleRegisters {
                address: 500,
                values: vec![0xFFFF, 0xFA24]
            }
        )]
    );

    // pending values last one cycle only
    slave.clear_requests();
    cycle(&bridge).await;
    assert!(slave.requests().is_empty());
}

#[tokio::test]
async fn test_channel_shared_by_write_tasks_reaches_every_register() {
    let slave = Arc::new(MemorySlave::new());
    let bridge = bridge(&slave, settings());

    let set_limit: Channel<u16> = Channel::builder("ess0", "SetLimit").writable().build();
    let other_device: Channel<u16> = set_limit.clone();
    let protocol = ModbusProtocol::with_tasks(
        1,
        [
            Task::fc6_write_register(
                Priority::High,
                UnsignedWordElement::new(1).bind(&set_limit, Converter::identity()).boxed(),
            ),
            Task::fc6_write_register(
                Priority::High,
                UnsignedWordElement::new(2).bind(&set_limit, Converter::identity()).boxed(),
            ),
        ],
    )
    .unwrap();
    let mirror = ModbusProtocol::with_tasks(
        2,
        [Task::fc6_write_register(
            Priority::High,
            UnsignedWordElement::new(3).bind(&other_device, Converter::identity()).boxed(),
        )],
    )
    .unwrap();
    bridge.add_protocol("ess0", Arc::new(protocol));
    bridge.add_protocol("ess1", Arc::new(mirror));

    set_limit.push_write(9).unwrap();
    cycle(&bridge).await;

    assert_eq!(slave.register(1), 9);
    assert_eq!(slave.register(2), 9);
    assert_eq!(slave.register(3), 9);
    assert_eq!(slave.requests().len(), 3);
    assert!(!set_limit.has_shadow_copy());

    // resolved once, written once
    slave.clear_requests();
    cycle(&bridge).await;
    assert!(slave.requests().is_empty());
}

#[tokio::test]
async fn test_failed_write_is_not_retried() {
    let slave = Arc::new(MemorySlave::new());
    let bridge = bridge(&slave, settings());

    let relay: Channel<bool> = Channel::builder("io0", "Relay1").writable().build();
    let protocol = ModbusProtocol::with_tasks(
        7,
        [Task::fc5_write_coil(
            Priority::High,
            CoilElement::new(3).bind(&relay, Converter::identity()).boxed(),
        )],
    )
    .unwrap();
    bridge.add_protocol("io0", Arc::new(protocol));

    slave.set_offline(true);
    relay.push_write(true).unwrap();
    bridge.before_process_image().await;
    bridge.execute_write().await;
    assert_eq!(slave.requests().len(), 1);
    assert_eq!(bridge.worker().diagnostics().write_failures.value(), Some(1));

    slave.set_offline(false);
    slave.clear_requests();
    cycle(&bridge).await;
    assert!(slave.requests().is_empty());
    assert!(!slave.coil(3));

    relay.push_write(true).unwrap();
    cycle(&bridge).await;
    assert!(slave.coil(3));
}

#[tokio::test]
async fn test_protocols_run_in_source_id_order() {
    let slave = Arc::new(MemorySlave::new());
    let bridge = bridge(&slave, settings());
    for (source_id, unit_id) in [("meter2", 2), ("meter1", 1), ("meter3", 3)] {
        let protocol = ModbusProtocol::new(unit_id);
        protocol.add_task(read_task(0, Priority::High));
        bridge.add_protocol(source_id, Arc::new(protocol));
    }

    bridge.before_process_image().await;
    let units: Vec<u8> = slave.requests().into_iter().map(|(unit, _)| unit).collect();
    assert_eq!(units, vec![1, 2, 3]);

    bridge.remove_protocol("meter2");
    slave.clear_requests();
    bridge.before_process_image().await;
    let units: Vec<u8> = slave.requests().into_iter().map(|(unit, _)| unit).collect();
    assert_eq!(units, vec![1, 3]);
}
