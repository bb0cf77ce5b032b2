//! Bridge over a real TCP socket against a minimal Modbus TCP slave

#![allow(clippy::disallowed_methods)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use voltage_channel::Channel;
use voltage_comlink::ConnectionState;
use voltage_protocols::modbus::{
    build_tcp_frame, Bridge, BridgeConfig, Converter, FloatDoublewordElement, LinkTransport, ModbusElement,
    ModbusPdu, ModbusProtocol, ModbusTransport, Priority, Task, UnsignedWordElement,
};

type Registers = Arc<Mutex<BTreeMap<u16, u16>>>;

fn reply(request: &[u8], registers: &Registers) -> Vec<u8> {
    let address = u16::from_be_bytes([request[1], request[2]]);
    let quantity = u16::from_be_bytes([request[3], request[4]]);
    let mut pdu = vec![request[0]];
    match request[0] {
        0x03 => {
            let registers = registers.lock();
            pdu.push((quantity * 2) as u8);
            for offset in 0..quantity {
                let value = registers.get(&(address + offset)).copied().unwrap_or(0);
                pdu.extend_from_slice(&value.to_be_bytes());
            }
        },
        0x10 => {
            let mut registers = registers.lock();
            for offset in 0..quantity as usize {
                let at = 6 + offset * 2;
                registers.insert(address + offset as u16, u16::from_be_bytes([request[at], request[at + 1]]));
            }
            pdu.extend_from_slice(&request[1..5]);
        },
        function => {
            pdu[0] = function | 0x80;
            pdu.push(0x01);
        },
    }
    pdu
}

async fn serve(mut socket: TcpStream, registers: Registers) {
    let mut header = [0u8; 7];
    while socket.read_exact(&mut header).await.is_ok() {
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        let mut request = vec![0u8; length - 1];
        if socket.read_exact(&mut request).await.is_err() {
            return;
        }
        let tid = u16::from_be_bytes([header[0], header[1]]);
        let pdu = ModbusPdu::from_slice(&reply(&request, &registers)).unwrap();
        if socket.write_all(&build_tcp_frame(tid, header[6], &pdu)).await.is_err() {
            return;
        }
    }
}

async fn slave() -> (u16, Registers) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let registers: Registers = Arc::default();
    let shared = Arc::clone(&registers);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve(socket, Arc::clone(&shared)));
        }
    });
    (port, registers)
}

#[tokio::test]
async fn test_read_and_write_over_tcp() {
    let (port, registers) = slave().await;
    {
        let mut registers = registers.lock();
        registers.insert(0, 2301);
        // 50.0f32, ABCD
        registers.insert(1, 0x4248);
        registers.insert(2, 0x0000);
    }

    let voltage: Channel<f64> = Channel::builder("meter0", "Voltage").unit("V").build();
    let frequency: Channel<f32> = Channel::builder("meter0", "Frequency").unit("Hz").build();
    let limit: Channel<u16> = Channel::builder("meter0", "CurrentLimit").writable().build();

    let protocol = ModbusProtocol::with_tasks(
        1,
        [
            Task::fc3_read_holding_registers(
                0,
                Priority::High,
                vec![
                    UnsignedWordElement::new(0)
                        .bind(&voltage, Converter::scale_pow10(-1))
                        .boxed(),
                    FloatDoublewordElement::new(1)
                        .bind(&frequency, Converter::identity())
                        .boxed(),
                ],
            ),
            Task::fc16_write_registers(
                40,
                Priority::High,
                vec![UnsignedWordElement::new(40).bind(&limit, Converter::identity()).boxed()],
            ),
        ],
    )
    .unwrap();

    let bridge =
        Bridge::from_config(&BridgeConfig::tcp("meter-link", "127.0.0.1", port), Duration::from_secs(1)).unwrap();
    bridge.add_protocol("meter0", Arc::new(protocol));

    bridge.before_process_image().await;
    assert_eq!(voltage.value(), Some(230.1));
    assert_eq!(frequency.value(), Some(50.0));

    limit.push_write(32).unwrap();
    bridge.execute_write().await;
    assert_eq!(registers.lock().get(&40).copied(), Some(32));
    assert_eq!(bridge.worker().diagnostics().write_failures.value(), Some(0));

    bridge.close().await.unwrap();
    bridge.before_process_image().await;
    assert_eq!(voltage.value(), None);

    bridge.open().await.unwrap();
    bridge.before_process_image().await;
    assert_eq!(voltage.value(), Some(230.1));
}

#[tokio::test]
async fn test_exception_response() {
    let (port, _) = slave().await;
    let transport = LinkTransport::from_config(&BridgeConfig::tcp("meter-link", "127.0.0.1", port));

    let request = voltage_protocols::modbus::ModbusRequest::ReadInputRegisters {
        address: 0,
        quantity: 2,
    };
    let err = transport.execute(1, &request).await.unwrap_err();
    assert!(err.is_device_exception());
    assert_eq!(transport.manager().state().await, ConnectionState::Connected);
}
