#[cfg(not(target_arch = "wasm32"))]
mod link_scenarios;
#[cfg(target_arch = "wasm32")]
mod wasm;
