pub use gridfield_core::*;

#[cfg(feature = "python")]
mod python {
    use gridfield_core::python::core;
    use pyo3::prelude::*;
    use pyo3::wrap_pymodule;

    #[pymodule]
    #[pyo3(name = "_lib")]
    fn gridfield(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add("__version__", env!("CARGO_PKG_VERSION"))?;
        m.add_wrapped(wrap_pymodule!(core))?;

        let sys = PyModule::import_bound(m.py(), "sys")?;
        sys.getattr("modules")?
            .set_item("gridfield._lib.core", m.getattr("core")?)?;
        Ok(())
    }
}
