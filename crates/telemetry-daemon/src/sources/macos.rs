//! macOS sources backed by sysctl and Mach host statistics.

use std::ffi::CStr;
use std::mem;

use telemetry_core::{unix_time_ms, Error, MetricSnapshot, Result};

use super::cpu::CpuBaseline;
use super::MetricSource;

/// Reads a fixed-size sysctl value by name.
fn sysctl_by_name<T: Copy>(name: &CStr) -> Option<T> {
    let mut value = mem::MaybeUninit::<T>::uninit();
    let mut len = mem::size_of::<T>();

    // SAFETY: the output pointer and length describe a buffer of exactly size_of::<T>() bytes
    let rc = unsafe {
        libc::sysctlbyname(
            name.as_ptr(),
            value.as_mut_ptr().cast(),
            &mut len,
            std::ptr::null_mut(),
            0,
        )
    };
    if rc != 0 || len != mem::size_of::<T>() {
        return None;
    }

    // SAFETY: sysctlbyname filled all size_of::<T>() bytes
    Some(unsafe { value.assume_init() })
}

/// CPU usage from `host_processor_info` tick deltas, summed over all CPUs.
pub struct MacCpuSource {
    baseline: CpuBaseline,
}

impl MacCpuSource {
    pub fn new() -> Self {
        Self {
            baseline: CpuBaseline::new(),
        }
    }

    /// Returns (total, idle) ticks summed over every processor.
    #[allow(deprecated)]
    fn read_ticks() -> Option<(u64, u64)> {
        let mut cpu_count: libc::natural_t = 0;
        let mut info: libc::processor_info_array_t = std::ptr::null_mut();
        let mut info_count: libc::mach_msg_type_number_t = 0;

        // SAFETY: all out-pointers are valid locals; on success the kernel hands
        // us an array of `info_count` integers that we release below
        let kr = unsafe {
            libc::host_processor_info(
                libc::mach_host_self(),
                libc::PROCESSOR_CPU_LOAD_INFO,
                &mut cpu_count,
                &mut info,
                &mut info_count,
            )
        };
        if kr != libc::KERN_SUCCESS || info.is_null() {
            return None;
        }

        let stride = libc::CPU_STATE_MAX as usize;
        // SAFETY: the array holds `info_count` integers, CPU_STATE_MAX per processor
        let ticks = unsafe { std::slice::from_raw_parts(info, info_count as usize) };
        let (mut total, mut idle) = (0u64, 0u64);
        for cpu in ticks.chunks_exact(stride).take(cpu_count as usize) {
            let tick = |state: libc::c_int| u64::from(cpu[state as usize] as u32);
            let cpu_idle = tick(libc::CPU_STATE_IDLE);
            total += tick(libc::CPU_STATE_USER)
                + tick(libc::CPU_STATE_SYSTEM)
                + tick(libc::CPU_STATE_NICE)
                + cpu_idle;
            idle += cpu_idle;
        }

        // SAFETY: releases exactly the region returned by host_processor_info
        unsafe {
            libc::vm_deallocate(
                libc::mach_task_self(),
                info as libc::vm_address_t,
                info_count as libc::vm_size_t * mem::size_of::<libc::integer_t>(),
            );
        }
        Some((total, idle))
    }
}

impl Default for MacCpuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for MacCpuSource {
    fn name(&self) -> &str {
        "macos_cpu"
    }

    fn collect(&mut self, snapshot: &mut MetricSnapshot) -> Result<()> {
        let (total, idle) = Self::read_ticks()
            .ok_or_else(|| Error::Unavailable("host_processor_info failed".to_string()))?;
        snapshot.set_cpu_usage(self.baseline.usage(total, idle));
        Ok(())
    }
}

/// Physical memory from `hw.memsize`; available memory approximated as free plus inactive pages.
pub struct MacMemorySource;

impl MacMemorySource {
    #[allow(deprecated)]
    fn vm_statistics() -> Option<libc::vm_statistics64> {
        let mut stats = mem::MaybeUninit::<libc::vm_statistics64>::zeroed();
        let mut count = libc::HOST_VM_INFO64_COUNT;

        // SAFETY: `count` is the size of vm_statistics64 in integer_t units
        let kr = unsafe {
            libc::host_statistics64(
                libc::mach_host_self(),
                libc::HOST_VM_INFO64,
                stats.as_mut_ptr().cast(),
                &mut count,
            )
        };
        if kr != libc::KERN_SUCCESS {
            return None;
        }

        // SAFETY: zero-initialised and filled by host_statistics64
        Some(unsafe { stats.assume_init() })
    }
}

impl MetricSource for MacMemorySource {
    fn name(&self) -> &str {
        "macos_mem"
    }

    fn collect(&mut self, snapshot: &mut MetricSnapshot) -> Result<()> {
        let memsize: u64 = sysctl_by_name(c"hw.memsize")
            .ok_or_else(|| Error::Unavailable("sysctl hw.memsize failed".to_string()))?;
        let stats = Self::vm_statistics()
            .ok_or_else(|| Error::Unavailable("host_statistics64 failed".to_string()))?;

        // SAFETY: sysconf has no preconditions
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let page_size = u64::try_from(page_size)
            .ok()
            .filter(|&size| size > 0)
            .ok_or_else(|| Error::Unavailable("page size unknown".to_string()))?;

        let available_pages = u64::from(stats.free_count) + u64::from(stats.inactive_count);
        snapshot.mem_total_kb = memsize / 1024;
        snapshot.mem_available_kb = available_pages * page_size / 1024;
        Ok(())
    }
}

/// Uptime derived from `kern.boottime`.
pub struct MacUptimeSource;

impl MetricSource for MacUptimeSource {
    fn name(&self) -> &str {
        "macos_uptime"
    }

    fn collect(&mut self, snapshot: &mut MetricSnapshot) -> Result<()> {
        let boot: libc::timeval = sysctl_by_name(c"kern.boottime")
            .ok_or_else(|| Error::Unavailable("sysctl kern.boottime failed".to_string()))?;

        let now_s = unix_time_ms() / 1000;
        let boot_s = u64::try_from(boot.tv_sec).unwrap_or(0);
        snapshot.uptime_s = now_s.saturating_sub(boot_s);
        Ok(())
    }
}

/// CPU temperature has no stable public API on macOS.
pub struct MacTemperatureSource;

impl MetricSource for MacTemperatureSource {
    fn name(&self) -> &str {
        "macos_temperature"
    }

    fn collect(&mut self, _snapshot: &mut MetricSnapshot) -> Result<()> {
        Err(Error::Unavailable(
            "temperature unsupported on macOS by default".to_string(),
        ))
    }
}
