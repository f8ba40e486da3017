//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod runtime;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use tensor_bridge::engine::{TensorType, TensorsData, TensorsInfo};
use tensor_bridge::{BridgeConfig, PipelineManager};

pub use engine::ScriptedEngine;
pub use runtime::{Call, InvokeScript, MockInstance, MockSurface, RecordingRuntime};

/// Ordered record of what the engine and runtime doubles did, shared by both.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub type Manager = PipelineManager<ScriptedEngine, RecordingRuntime>;

/// First byte that makes the runtime refuse to convert a buffer.
pub const POISON: u8 = 0xEE;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn u8_info(len: u32) -> TensorsInfo {
    TensorsInfo::single(TensorType::Uint8, [len])
}

pub fn u8_data(bytes: &[u8]) -> TensorsData {
    TensorsData::new(vec![bytes.to_vec()])
}

pub fn manager(
    engine: ScriptedEngine,
    runtime: RecordingRuntime,
) -> (Manager, Arc<ScriptedEngine>, Arc<RecordingRuntime>) {
    let engine = Arc::new(engine);
    let runtime = Arc::new(runtime);
    let manager = PipelineManager::new(engine.clone(), runtime.clone(), BridgeConfig::default());
    (manager, engine, runtime)
}

/// Position of the first journal line starting with `prefix`.
pub fn position(journal: &Journal, prefix: &str) -> Option<usize> {
    journal.lock().iter().position(|line| line.starts_with(prefix))
}

/// Poll `condition` until it holds or two seconds pass.
pub fn wait_for(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
