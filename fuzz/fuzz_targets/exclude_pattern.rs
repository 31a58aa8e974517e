#![no_main]

use libfuzzer_sys::fuzz_target;
use lineage::filter::ExcludeFilter;
use lineage::procfs::split_nul_records;
use lineage::tracee::Tracee;
use nix::unistd::Pid;

fuzz_target!(|data: &[u8]| {
    // First record is the pattern, the rest are a tracee's arguments
    let mut records = split_nul_records(data).into_iter();
    let Some(pattern) = records.next() else {
        return;
    };

    // Compiling and matching should not panic regardless of input
    if let Ok(filter) = ExcludeFilter::from_pattern(&pattern) {
        let mut tracee = Tracee::new(Pid::from_raw(1));
        tracee.arguments = Some(records.collect());
        let _ = filter.excludes(&tracee);
    }
});
