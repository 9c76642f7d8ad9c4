//! Minimal example supermodule.
//!
//! Built as a `cdylib`, it exports the three entry points the native loader
//! looks up. Host and supermodule must be built by the same toolchain since
//! the creation table crosses the boundary with the Rust ABI.
//!
//! A `cdylib` links its own copy of `tracing-core`, so events emitted here
//! never reach the host's subscriber. The hooks only keep a load count; the
//! native loader logs when it runs them.

use std::sync::atomic::{AtomicUsize, Ordering};

use pulsar_cache::CachePolicy;
use pulsar_modules::{ComputationState, ConstructModule, CreationFuncs, Module, ModuleCore, ModuleError, ModuleId, Result};
use pulsar_options::OptionError;

static LIVE_LOADS: AtomicUsize = AtomicUsize::new(0);

/// Number of hosts that ran `initialize_supermodule` without finalizing yet.
pub fn live_loads() -> usize {
	LIVE_LOADS.load(Ordering::SeqCst)
}

/// Energy of a harmonic oscillator, `k * x^2 / 2`.
///
/// Options: `force_constant` (float, required) and `displacement`
/// (float, default `0.0`).
pub struct HarmonicEnergy {
	core: ModuleCore,
}

impl Module for HarmonicEnergy {
	fn core(&self) -> &ModuleCore {
		&self.core
	}

	fn core_mut(&mut self) -> &mut ModuleCore {
		&mut self.core
	}
}

impl ConstructModule for HarmonicEnergy {
	fn construct(id: ModuleId) -> Self {
		Self { core: ModuleCore::new(id) }
	}
}

impl HarmonicEnergy {
	pub fn energy(&self) -> Result<f64> {
		let options = self.core.options()?;
		let k = options.get::<f64>("force_constant").map_err(|source| self.option_error(source))?;
		let x = options.get::<f64>("displacement").map_err(|source| self.option_error(source))?;

		let key = format!("energy:{k}:{x}");
		let cache = self.core.cache()?;
		if let Some(energy) = cache.get::<f64>(&key, true)? {
			return Ok(*energy);
		}
		let energy = 0.5 * k * x * x;
		cache.set(&key, energy, CachePolicy::DISTRIBUTE_GLOBAL | CachePolicy::CHECKPOINT_GLOBAL)?;
		self.core.print(&format!("E({x}) = {energy}\n"));
		self.core.set_final_state(ComputationState::encode(&energy)?)?;
		Ok(energy)
	}

	fn option_error(&self, source: OptionError) -> ModuleError {
		ModuleError::Option {
			key: self.core.key().unwrap_or_default().to_string(),
			source,
		}
	}
}

/// Central finite-difference derivative of the energy of `energy_key`.
///
/// Each displacement is evaluated by a child module registered under
/// `energy_key` with its `displacement` option already set.
pub struct FiniteDifference {
	core: ModuleCore,
}

impl Module for FiniteDifference {
	fn core(&self) -> &ModuleCore {
		&self.core
	}

	fn core_mut(&mut self) -> &mut ModuleCore {
		&mut self.core
	}
}

impl ConstructModule for FiniteDifference {
	fn construct(id: ModuleId) -> Self {
		Self { core: ModuleCore::new(id) }
	}
}

impl FiniteDifference {
	pub fn derivative(&self, forward_key: &str, backward_key: &str, step: f64) -> Result<f64> {
		let forward = self.core.create_child::<HarmonicEnergy>(forward_key)?.energy()?;
		let backward = self.core.create_child::<HarmonicEnergy>(backward_key)?.energy()?;
		let derivative = (forward - backward) / (2.0 * step);
		self.core.print(&format!("dE/dx = {derivative}\n"));
		Ok(derivative)
	}
}

#[unsafe(no_mangle)]
pub fn initialize_supermodule() {
	LIVE_LOADS.fetch_add(1, Ordering::SeqCst);
}

#[unsafe(no_mangle)]
pub fn insert_supermodule() -> CreationFuncs {
	let mut funcs = CreationFuncs::new();
	funcs.add_native_creator::<HarmonicEnergy>("HarmonicEnergy");
	funcs.add_native_creator::<FiniteDifference>("FiniteDifference");
	funcs
}

#[unsafe(no_mangle)]
pub fn finalize_supermodule() {
	let _ = LIVE_LOADS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |loads| loads.checked_sub(1));
}
