//! Loader scaffolding embedded in every snapshot script.
//!
//! The script evaluates to a single `snapshotResult` object. Nothing runs at
//! evaluation time except module registration; the embedder activates the
//! snapshot with `setGlobals` and then calls
//! `customRequire(snapshotResult.mainModuleKey)`.

/// Top-level binding holding the loader
pub const RESULT_BINDING: &str = "snapshotResult";

/// Top-level binding holding the auxiliary data literal, when supplied
pub const AUXILIARY_DATA_BINDING: &str = "snapshotAuxiliaryData";

/// Opens the loader closure. `global` and `process` are shadowed so inlined
/// modules only see the values handed to `setGlobals`.
pub const PREAMBLE: &str = r#"var snapshotResult = (function () {
  let global = undefined;
  let process = undefined;
  let hostRequire = null;
  let activated = false;
  const hostEnvironment = { primary: undefined, secondary: undefined };
  const hasOwn = (object, key) => Object.prototype.hasOwnProperty.call(object, key);

  function customRequire(key) {
    if (hasOwn(customRequire.hostRequests, key)) {
      return requireFromHost(key);
    }
    let module = customRequire.cache[key];
    if (module !== undefined) {
      return module.exports;
    }
    if (!hasOwn(customRequire.definitions, key)) {
      throw new Error("Cannot find module '" + key + "' in snapshot");
    }
    const definition = customRequire.definitions[key];
    module = { id: key, exports: {}, loaded: false };
    customRequire.cache[key] = module;
    definition.fn.call(
      module.exports,
      module.exports,
      module,
      bindRequire(definition),
      definition.filename,
      definition.dirname
    );
    module.loaded = true;
    return module.exports;
  }
  customRequire.cache = Object.create(null);
  customRequire.definitions = Object.create(null);
  customRequire.hostRequests = Object.create(null);
  customRequire.environment = hostEnvironment;

  function requireFromHost(key) {
    if (hostRequire === null) {
      throw new Error("Cannot load '" + key + "' before the snapshot is activated");
    }
    const exports = hostRequire(customRequire.hostRequests[key]);
    if (customRequire.cache[key] === undefined) {
      customRequire.cache[key] = { id: key, exports: exports, loaded: true };
    }
    return exports;
  }

  function bindRequire(definition) {
    function require(specifier) {
      return customRequire(require.resolve(specifier));
    }
    require.resolve = function (specifier) {
      if (!hasOwn(definition.resolutions, specifier)) {
        throw new Error("Cannot find module '" + specifier + "' from '" + definition.filename + "'");
      }
      return definition.resolutions[specifier];
    };
    require.cache = customRequire.cache;
    return require;
  }

  function setGlobals(newGlobal, newProcess, primaryEnvironment, secondaryEnvironment, newRequire) {
    if (activated) {
      throw new Error('Snapshot has already been activated');
    }
    activated = true;
    global = newGlobal;
    process = newProcess;
    hostEnvironment.primary = primaryEnvironment;
    hostEnvironment.secondary = secondaryEnvironment;
    hostRequire = newRequire;
  }

  function translateLineNumber(lineNumber) {
    let low = 0;
    let high = positionTable.length - 1;
    while (low <= high) {
      const mid = (low + high) >> 1;
      const span = positionTable[mid];
      if (lineNumber < span.startLine) {
        high = mid - 1;
      } else if (lineNumber >= span.endLine) {
        low = mid + 1;
      } else {
        return { filename: span.file, lineNumber: lineNumber - span.startLine + span.offset };
      }
    }
    return { filename: '<embedded>', lineNumber: lineNumber };
  }
"#;

/// Parameter list shared by every module wrapper
pub const MODULE_PARAMS: &str = "exports, module, require, __filename, __dirname";

/// Closes the loader closure and hands out its entry points
pub const EPILOGUE: &str = r#"  return {
    customRequire: customRequire,
    setGlobals: setGlobals,
    translateLineNumber: translateLineNumber,
    mainModuleKey: mainModuleKey,
  };
})();"#;
