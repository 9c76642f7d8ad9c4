mod common;

use std::io::Write;
use std::sync::{Arc, Barrier};
use std::thread;

use common::{CHEM_LIB, Scf, ScriptInterpreter, StaticLoader, chem_funcs, greeter_script};
use pretty_assertions::assert_eq;
use pulsar_comm::{Communicator, LocalWorld};
use pulsar_modules::{ForeignValue, ManagerConfig, Module, ModuleError, ModuleInfo, ModuleManager, SupermoduleKind};

fn chem_manager() -> pulsar_modules::ManagerBuilder {
	ModuleManager::builder().loader(Box::new(StaticLoader::default().with(CHEM_LIB, chem_funcs())))
}

#[test]
fn interpreted_modules_are_created_and_released() {
	let interpreter = ScriptInterpreter::default().with("greet.py", greeter_script());
	let mm = chem_manager().interpreter(Arc::new(interpreter)).build();
	mm.load_module_from_minfo(ModuleInfo::new("Greeter", SupermoduleKind::Interpreted, "greet.py"), "hello")
		.unwrap();
	mm.load_module_from_minfo(ModuleInfo::new("Scf", SupermoduleKind::Native, CHEM_LIB), "scf")
		.unwrap();

	let mut handle = mm.create_module_foreign("hello", None).unwrap();
	assert_eq!(handle.origin(), Some(SupermoduleKind::Interpreted));
	let id = handle.base().unwrap().core().id();
	let reply = handle.as_foreign().unwrap().call_method("greet", &[ForeignValue::Str("world".into())]).unwrap();
	assert!(matches!(reply, ForeignValue::Str(text) if text == format!("hello world from {id}")));

	assert!(matches!(mm.create_module::<Scf>("hello", None), Err(ModuleError::TypeMismatch { .. })));

	assert!(matches!(
		handle.into_native(),
		Err(ModuleError::WrongOrigin {
			found: SupermoduleKind::Interpreted,
			..
		})
	));
	assert!(mm.tree_node(id).unwrap().in_use());

	let object = handle.release_foreign().unwrap();
	assert_eq!(object.type_name(), "Greeter");
	assert!(handle.is_empty());
	assert!(!mm.tree_node(id).unwrap().in_use());
	assert!(matches!(handle.release_foreign(), Err(ModuleError::EmptyHandle)));

	let mut native = mm.create_module_foreign("scf", None).unwrap();
	let native_id = native.base().unwrap().core().id();
	assert!(matches!(
		native.release_foreign(),
		Err(ModuleError::WrongOrigin {
			found: SupermoduleKind::Native,
			..
		})
	));
	assert_eq!(native.origin(), Some(SupermoduleKind::Native));
	assert!(mm.tree_node(native_id).unwrap().in_use());

	let module = native.into_native().unwrap();
	assert!(native.is_empty());
	assert!(module.is::<Scf>());
	drop(module);
	assert!(!mm.tree_node(native_id).unwrap().in_use());
}

#[test]
fn config_file_drives_registration() {
	let mut file = tempfile::NamedTempFile::new().unwrap();
	write!(
		file,
		r#"
		debug_all = true

		[[module]]
		key = "scf"
		name = "Scf"
		type = "native"
		path = "{CHEM_LIB}"
		version = "2.1"
		authors = ["A. Chemist"]

		[module.options.basis]
		kind = "string"
		default = "sto-3g"
		"#
	)
	.unwrap();

	let config = ManagerConfig::from_file(file.path()).unwrap();
	let mm = chem_manager().build();
	mm.load_config(&config).unwrap();

	let info = mm.module_key_info("scf").unwrap();
	assert_eq!(info.authors, vec!["A. Chemist".to_string()]);
	assert_eq!(info.cache_scope(), "Scf_v2.1");
	assert_eq!(info.options.get::<String>("basis").unwrap(), "sto-3g");

	let scf = mm.create_module::<Scf>("scf", None).unwrap();
	assert!(scf.core().debug_enabled());
	assert_eq!(scf.energy("h2").unwrap(), -2.0);
	assert_eq!(scf.energy("h2").unwrap(), -2.0);
	assert_eq!(mm.tree_node(scf.core().id()).unwrap().output(), "computed\ncache hit\n");

	assert!(matches!(
		ManagerConfig::from_file(file.path().with_extension("missing")),
		Err(ModuleError::Config { .. })
	));
}

#[test]
fn module_caches_are_shared_across_ranks() {
	let world = LocalWorld::new(2).unwrap();
	let barrier = Arc::new(Barrier::new(2));

	thread::scope(|scope| {
		for comm in world.comms() {
			let barrier = Arc::clone(&barrier);
			scope.spawn(move || {
				let rank = comm.rank();
				let mm = chem_manager().communicator(comm).build();
				mm.load_module_from_minfo(ModuleInfo::new("Scf", SupermoduleKind::Native, CHEM_LIB).with_version("1"), "scf")
					.unwrap();
				mm.start_cache_sync(30).unwrap();
				barrier.wait();

				let scf = mm.create_module::<Scf>("scf", None).unwrap();
				if rank == 1 {
					assert_eq!(scf.energy("h2o").unwrap(), -3.0);
				}
				barrier.wait();

				if rank == 0 {
					assert_eq!(scf.energy("h2o").unwrap(), -3.0);
					assert_eq!(mm.tree_node(scf.core().id()).unwrap().output(), "cache hit\n");
					assert_eq!(mm.cache().count("Scf_v1:energy:h2o"), 1);
				}
				barrier.wait();

				drop(scf);
				mm.stop_cache_sync().unwrap();
			});
		}
	});
}
