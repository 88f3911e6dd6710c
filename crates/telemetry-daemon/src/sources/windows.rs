//! Windows sources backed by PDH and the system information API.

use std::mem;

use telemetry_core::{Error, MetricSnapshot, Result};
use windows_sys::Win32::System::Performance::{
    PdhAddEnglishCounterW, PdhCloseQuery, PdhCollectQueryData, PdhGetFormattedCounterValue,
    PdhOpenQueryW, PDH_FMT_COUNTERVALUE, PDH_FMT_DOUBLE, PDH_HCOUNTER, PDH_HQUERY,
};
use windows_sys::Win32::System::SystemInformation::{
    GetTickCount64, GlobalMemoryStatusEx, MEMORYSTATUSEX,
};

use super::MetricSource;

const PDH_SUCCESS: u32 = 0;
const TOTAL_PROCESSOR_TIME: &str = "\\Processor(_Total)\\% Processor Time";

/// CPU usage from the `% Processor Time` performance counter.
pub struct WindowsCpuSource {
    query: Option<(PDH_HQUERY, PDH_HCOUNTER)>,
}

// SAFETY: PDH handles are not tied to the creating thread and are only used through &mut self
unsafe impl Send for WindowsCpuSource {}

impl WindowsCpuSource {
    /// Opens the counter query and primes it with a first sample.
    ///
    /// When PDH is unusable the source stays installed and reports `Unavailable`.
    pub fn new() -> Self {
        Self {
            query: Self::open_query(),
        }
    }

    fn open_query() -> Option<(PDH_HQUERY, PDH_HCOUNTER)> {
        let path: Vec<u16> = TOTAL_PROCESSOR_TIME.encode_utf16().chain(Some(0)).collect();

        // SAFETY: out-pointers are valid locals and `path` is NUL-terminated
        unsafe {
            let mut query: PDH_HQUERY = mem::zeroed();
            if PdhOpenQueryW(std::ptr::null(), 0, &mut query) != PDH_SUCCESS {
                return None;
            }
            let mut counter: PDH_HCOUNTER = mem::zeroed();
            if PdhAddEnglishCounterW(query, path.as_ptr(), 0, &mut counter) != PDH_SUCCESS {
                PdhCloseQuery(query);
                return None;
            }
            PdhCollectQueryData(query);
            Some((query, counter))
        }
    }
}

impl Default for WindowsCpuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WindowsCpuSource {
    fn drop(&mut self) {
        if let Some((query, _)) = self.query.take() {
            // SAFETY: the query was opened by open_query and is closed once
            unsafe {
                PdhCloseQuery(query);
            }
        }
    }
}

impl MetricSource for WindowsCpuSource {
    fn name(&self) -> &str {
        "windows_cpu"
    }

    fn collect(&mut self, snapshot: &mut MetricSnapshot) -> Result<()> {
        let (query, counter) = self
            .query
            .ok_or_else(|| Error::Unavailable("PDH unavailable".to_string()))?;

        // SAFETY: handles are live for the lifetime of self; `value` is a valid out-pointer
        let pct = unsafe {
            if PdhCollectQueryData(query) != PDH_SUCCESS {
                return Err(Error::Unavailable("PDH collect failed".to_string()));
            }
            let mut value: PDH_FMT_COUNTERVALUE = mem::zeroed();
            if PdhGetFormattedCounterValue(counter, PDH_FMT_DOUBLE, std::ptr::null_mut(), &mut value)
                != PDH_SUCCESS
            {
                return Err(Error::Unavailable("PDH format failed".to_string()));
            }
            value.Anonymous.doubleValue
        };

        snapshot.set_cpu_usage(pct);
        Ok(())
    }
}

/// Physical memory from `GlobalMemoryStatusEx`.
pub struct WindowsMemorySource;

impl MetricSource for WindowsMemorySource {
    fn name(&self) -> &str {
        "windows_mem"
    }

    fn collect(&mut self, snapshot: &mut MetricSnapshot) -> Result<()> {
        // SAFETY: dwLength is set before the call as the API requires
        let status = unsafe {
            let mut status: MEMORYSTATUSEX = mem::zeroed();
            status.dwLength = mem::size_of::<MEMORYSTATUSEX>() as u32;
            if GlobalMemoryStatusEx(&mut status) == 0 {
                return Err(Error::Unavailable(
                    "GlobalMemoryStatusEx failed".to_string(),
                ));
            }
            status
        };

        snapshot.mem_total_kb = status.ullTotalPhys / 1024;
        snapshot.mem_available_kb = status.ullAvailPhys / 1024;
        Ok(())
    }
}

/// Uptime from the system tick count.
pub struct WindowsUptimeSource;

impl MetricSource for WindowsUptimeSource {
    fn name(&self) -> &str {
        "windows_uptime"
    }

    fn collect(&mut self, snapshot: &mut MetricSnapshot) -> Result<()> {
        // SAFETY: no preconditions
        snapshot.uptime_s = unsafe { GetTickCount64() } / 1000;
        Ok(())
    }
}

/// Temperature needs WMI and vendor drivers.
pub struct WindowsTemperatureSource;

impl MetricSource for WindowsTemperatureSource {
    fn name(&self) -> &str {
        "windows_temperature"
    }

    fn collect(&mut self, _snapshot: &mut MetricSnapshot) -> Result<()> {
        Err(Error::Unavailable(
            "temperature unsupported on Windows by default".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_sources() {
        let mut snap = MetricSnapshot::default();
        WindowsCpuSource::new().collect(&mut snap).unwrap();
        assert!((0.0..=100.0).contains(&snap.cpu_usage_pct));

        WindowsMemorySource.collect(&mut snap).unwrap();
        assert!(snap.mem_total_kb > 0);
        assert!(snap.mem_available_kb <= snap.mem_total_kb);

        WindowsUptimeSource.collect(&mut snap).unwrap();
        assert!(snap.uptime_s > 0);

        let err = WindowsTemperatureSource.collect(&mut snap).unwrap_err();
        assert!(err.is_soft());
    }
}
