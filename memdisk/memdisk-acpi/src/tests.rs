use crate::fixtures::{FirmwareBuilder, TableSpec};
use crate::nfit::{Guid, SpaRange, spa_ranges};
use crate::{
    AcpiError, AcpiTables, DiscoveryState, HEADER_LEN, Placement, RootKind, RootPointer, SdtHeader,
    Signature, XSDT_STAGING_LEN, checksum, fadt, verify,
};
use memdisk_e820::{E820Map, MemoryRange, RangeType};
use memdisk_physmem::{PhysMemory, PhysSpan};

const APIC: Signature = Signature(*b"APIC");
const SCRATCH: u64 = 0x18_0000;

fn write_table(mem: &mut impl PhysMemory, at: u64, signature: Signature, body: &[u8]) {
    let length = u32::try_from(HEADER_LEN + body.len()).unwrap();
    mem.write_bytes(at, &SdtHeader::new(signature, length, 1).to_bytes())
        .unwrap();
    mem.write_bytes(at + HEADER_LEN as u64, body).unwrap();
}

/// Point the RSDP at a one-entry XSDT written at `at`, listing `entry`.
fn move_xsdt(mem: &mut impl PhysMemory, at: u64, entry: u64) {
    write_table(mem, at, Signature::XSDT, &entry.to_le_bytes());
    checksum(mem, at).unwrap();
    let mut rsdp = RootPointer::find(mem).unwrap();
    rsdp.set_xsdt_address(mem, at).unwrap();
}

fn nvdimm_root_body() -> Vec<u8> {
    let mut body = b"\x10\x23\\_SB_\x5B\x82\x1BNVDR\x08_HID\x0D".to_vec();
    body.extend_from_slice(b"ACPI0012\0");
    body
}

#[test]
fn discovers_both_root_tables_and_classifies_entries() {
    let mut fw = FirmwareBuilder::new()
        .rsdt()
        .xsdt()
        .gap(XSDT_STAGING_LEN)
        .table(TableSpec::fadt())
        .table(TableSpec::facs())
        .table(TableSpec::dsdt(&[0x10, 0x05, 0x5C, 0x00]))
        .table(TableSpec::ssdt(&nvdimm_root_body()))
        .table(TableSpec::new(Signature::NFIT, &[0; 4]))
        .build();
    let before = fw.ranges.clone();

    let mut tables = AcpiTables::new();
    tables.parse(&mut fw.memory, &mut fw.ranges).unwrap();

    assert_eq!(tables.state(), DiscoveryState::Done);
    assert_eq!(tables.primary(), Some(RootKind::Xsdt));
    assert_eq!(tables.root(RootKind::Xsdt).entries().len(), 3);
    assert_eq!(tables.root(RootKind::Rsdt).entries().len(), 3);
    assert_eq!(tables.nfit(), fw.address_of(Signature::NFIT));
    assert_eq!(tables.nvdimm_root(), fw.address_of(Signature::SSDT));
    assert_eq!(tables.rsdp().unwrap().address, fw.rsdp);
    // nothing sat in the staging area, so nothing was allocated
    assert_eq!(fw.ranges.as_slice(), before.as_slice());

    tables.dump(&fw.memory);
}

#[test]
fn acpi_1_firmware_is_rejected() {
    let mut fw = FirmwareBuilder::new()
        .rsdp_revision(0)
        .rsdt()
        .table(TableSpec::fadt())
        .build();

    let mut tables = AcpiTables::new();
    assert_eq!(
        tables.parse(&mut fw.memory, &mut fw.ranges),
        Err(AcpiError::IncompatibleRevision(0))
    );
    assert_eq!(tables.state(), DiscoveryState::Failed);
}

#[test]
fn tables_in_the_staging_area_are_relocated() {
    let mut fw = FirmwareBuilder::new()
        .xsdt()
        .table(TableSpec::ssdt(b"relocate me"))
        .gap(XSDT_STAGING_LEN)
        .table(TableSpec::fadt())
        .table(TableSpec::facs())
        .table(TableSpec::dsdt(&[]))
        .build();
    let xsdt = fw.xsdt.unwrap();
    let ssdt = fw.address_of(Signature::SSDT).unwrap();
    let span = PhysSpan::new(ssdt, HEADER_LEN + 11);
    let original = fw.memory.slice(span).unwrap().to_vec();

    let mut tables = AcpiTables::new();
    tables.parse(&mut fw.memory, &mut fw.ranges).unwrap();

    let moved = tables
        .root(RootKind::Xsdt)
        .read_slot(&fw.memory, xsdt + HEADER_LEN as u64)
        .unwrap();
    assert_eq!(moved, 0x1F_FFD0);
    assert_eq!(
        fw.memory.slice(PhysSpan::new(moved, span.len)).unwrap(),
        original.as_slice()
    );
    assert!(fw.memory.slice(span).unwrap().iter().all(|&b| b == 0));
    assert!(verify(&fw.memory, xsdt).unwrap());
    assert_eq!(fw.ranges.find(moved).unwrap().kind, RangeType::Reserved);
    assert!(tables.root(RootKind::Xsdt).entries().contains(&moved));
    assert!(!tables.root(RootKind::Xsdt).entries().contains(&ssdt));
}

#[test]
fn relocated_facs_is_repointed_from_the_fadt() {
    let mut fw = FirmwareBuilder::new()
        .xsdt()
        .table(TableSpec::facs())
        .gap(XSDT_STAGING_LEN)
        .table(TableSpec::fadt())
        .table(TableSpec::dsdt(&[]))
        .build();
    let facs = fw.address_of(Signature::FACS).unwrap();
    let fadt_at = fw.address_of(Signature::FADT).unwrap();
    let dsdt = fw.address_of(Signature::DSDT).unwrap();
    assert_eq!(
        fadt::references(&fw.memory, fadt_at).unwrap(),
        (Some(facs), Some(dsdt))
    );

    let mut tables = AcpiTables::new();
    tables.parse(&mut fw.memory, &mut fw.ranges).unwrap();

    // 64-byte aligned at the top of usable memory
    let moved = 0x1F_FFC0;
    assert_eq!(
        fadt::references(&fw.memory, fadt_at).unwrap(),
        (Some(moved), Some(dsdt))
    );
    assert!(verify(&fw.memory, fadt_at).unwrap());
    assert_eq!(&fw.memory.read_array::<4>(moved).unwrap(), b"FACS");
    assert_eq!(fw.memory.read_u32(facs).unwrap(), 0);
}

#[test]
fn relocation_without_memory_aborts_discovery() {
    let mut fw = FirmwareBuilder::new()
        .xsdt()
        .table(TableSpec::ssdt(b"relocate me"))
        .gap(XSDT_STAGING_LEN)
        .table(TableSpec::fadt())
        .build();
    fw.ranges =
        E820Map::from_firmware(&[MemoryRange::new(0xE_0000, 0x2_0000, RangeType::Reserved)])
            .unwrap();

    let mut tables = AcpiTables::new();
    let err = tables.parse(&mut fw.memory, &mut fw.ranges).unwrap_err();
    assert_eq!(err, AcpiError::OutOfMemory { length: 47 });
    assert!(err.aborts_insertion());
    assert!(!err.is_fatal());
    assert_eq!(tables.state(), DiscoveryState::Failed);
}

#[test]
fn insert_before_parse_is_rejected() {
    let mut fw = FirmwareBuilder::new().xsdt().build();
    write_table(&mut fw.memory, SCRATCH, APIC, &[0; 8]);

    let mut tables = AcpiTables::new();
    assert_eq!(
        tables.insert_table(&mut fw.memory, &mut fw.ranges, SCRATCH),
        Err(AcpiError::NotParsed)
    );
}

#[test]
fn insert_overrides_by_signature_and_mirrors_into_rsdt() {
    let mut fw = FirmwareBuilder::new()
        .rsdt()
        .xsdt()
        .gap(XSDT_STAGING_LEN)
        .table(TableSpec::fadt())
        .table(TableSpec::facs())
        .table(TableSpec::dsdt(&[]))
        .table(TableSpec::new(APIC, &[0; 8]))
        .build();
    let rsdt = fw.rsdt.unwrap();
    let xsdt = fw.xsdt.unwrap();
    let old = fw.address_of(APIC).unwrap();
    write_table(&mut fw.memory, SCRATCH, APIC, &[1; 16]);

    let mut tables = AcpiTables::new();
    tables.parse(&mut fw.memory, &mut fw.ranges).unwrap();
    let xsdt_len = tables.root(RootKind::Xsdt).length(&fw.memory).unwrap();

    let placement = tables
        .insert_table(&mut fw.memory, &mut fw.ranges, SCRATCH)
        .unwrap();
    assert_eq!(
        placement,
        Placement::Replaced {
            slot: xsdt + HEADER_LEN as u64 + 8,
            previous: old
        }
    );
    assert_eq!(tables.root(RootKind::Xsdt).length(&fw.memory).unwrap(), xsdt_len);
    assert_eq!(
        fw.memory.read_u32(rsdt + HEADER_LEN as u64 + 4).unwrap(),
        u32::try_from(SCRATCH).unwrap()
    );
    assert!(verify(&fw.memory, SCRATCH).unwrap());
    assert!(verify(&fw.memory, xsdt).unwrap());
    assert!(verify(&fw.memory, rsdt).unwrap());
}

#[test]
fn secondary_tables_are_always_appended() {
    let mut fw = FirmwareBuilder::new()
        .rsdt()
        .xsdt()
        .gap(XSDT_STAGING_LEN)
        .table(TableSpec::fadt())
        .table(TableSpec::ssdt(b"firmware"))
        .build();
    let xsdt = fw.xsdt.unwrap();
    write_table(&mut fw.memory, SCRATCH, Signature::SSDT, &nvdimm_root_body());

    let mut tables = AcpiTables::new();
    tables.parse(&mut fw.memory, &mut fw.ranges).unwrap();
    assert_eq!(tables.nvdimm_root(), None);
    let rsdt_len = tables.root(RootKind::Rsdt).length(&fw.memory).unwrap();
    let xsdt_len = tables.root(RootKind::Xsdt).length(&fw.memory).unwrap();

    let placement = tables
        .insert_table(&mut fw.memory, &mut fw.ranges, SCRATCH)
        .unwrap();
    assert_eq!(
        placement,
        Placement::Appended {
            slot: xsdt + u64::from(xsdt_len)
        }
    );
    assert_eq!(
        tables.root(RootKind::Xsdt).length(&fw.memory).unwrap(),
        xsdt_len + 8
    );
    assert_eq!(
        tables.root(RootKind::Rsdt).length(&fw.memory).unwrap(),
        rsdt_len
    );
    assert_eq!(tables.nvdimm_root(), Some(SCRATCH));
    assert!(verify(&fw.memory, xsdt).unwrap());
}

#[test]
fn staging_area_holds_sixteen_appends() {
    let mut fw = FirmwareBuilder::new()
        .xsdt()
        .gap(XSDT_STAGING_LEN)
        .table(TableSpec::fadt())
        .build();
    write_table(&mut fw.memory, SCRATCH, Signature::SSDT, b"extra");

    let mut tables = AcpiTables::new();
    tables.parse(&mut fw.memory, &mut fw.ranges).unwrap();
    for _ in 0..16 {
        tables
            .insert_table(&mut fw.memory, &mut fw.ranges, SCRATCH)
            .unwrap();
    }
    assert_eq!(
        tables.insert_table(&mut fw.memory, &mut fw.ranges, SCRATCH),
        Err(AcpiError::NoStagingSpace(RootKind::Xsdt))
    );
    assert!(verify(&fw.memory, fw.xsdt.unwrap()).unwrap());
}

#[test]
fn rsdt_only_firmware_overrides_but_cannot_append() {
    let mut fw = FirmwareBuilder::new()
        .rsdt()
        .table(TableSpec::fadt())
        .table(TableSpec::new(APIC, &[0; 8]))
        .build();
    write_table(&mut fw.memory, SCRATCH, APIC, &[2; 8]);
    write_table(&mut fw.memory, SCRATCH + 0x100, Signature::SSDT, b"extra");

    let mut tables = AcpiTables::new();
    tables.parse(&mut fw.memory, &mut fw.ranges).unwrap();
    assert_eq!(tables.primary(), Some(RootKind::Rsdt));

    let placement = tables
        .insert_table(&mut fw.memory, &mut fw.ranges, SCRATCH)
        .unwrap();
    assert!(matches!(placement, Placement::Replaced { .. }));
    assert!(verify(&fw.memory, fw.rsdt.unwrap()).unwrap());

    assert_eq!(
        tables.insert_table(&mut fw.memory, &mut fw.ranges, SCRATCH + 0x100),
        Err(AcpiError::NoStagingSpace(RootKind::Rsdt))
    );
}

#[test]
fn growing_the_nfit_moves_the_next_table_away() {
    let mut fw = FirmwareBuilder::new()
        .xsdt()
        .gap(XSDT_STAGING_LEN)
        .table(TableSpec::new(Signature::NFIT, &[0; 4]))
        .table(TableSpec::ssdt(b"next door"))
        .table(TableSpec::fadt())
        .build();
    let xsdt = fw.xsdt.unwrap();
    let nfit = fw.address_of(Signature::NFIT).unwrap();
    let ssdt = fw.address_of(Signature::SSDT).unwrap();

    let mut tables = AcpiTables::new();
    tables.parse(&mut fw.memory, &mut fw.ranges).unwrap();
    assert_eq!(tables.nfit(), Some(nfit));

    let spa = SpaRange::new(1, Guid::VIRTUAL_DISK, 0x1000_0000, 0x10_0000);
    let length = tables
        .extend_nfit(&mut fw.memory, &mut fw.ranges, &spa.to_bytes())
        .unwrap();
    assert_eq!(length, 96);
    assert!(verify(&fw.memory, nfit).unwrap());
    assert_eq!(spa_ranges(&fw.memory, nfit).unwrap().collect::<Vec<_>>(), [spa]);

    // the SSDT was the second XSDT entry and now lives at the top of memory
    let moved = tables
        .root(RootKind::Xsdt)
        .read_slot(&fw.memory, xsdt + HEADER_LEN as u64 + 8)
        .unwrap();
    assert_ne!(moved, ssdt);
    assert_eq!(&fw.memory.read_array::<4>(moved).unwrap(), b"SSDT");
    assert!(verify(&fw.memory, xsdt).unwrap());
}

#[test]
fn clear_region_leaves_tables_outside_alone() {
    let mut fw = FirmwareBuilder::new()
        .xsdt()
        .gap(XSDT_STAGING_LEN)
        .table(TableSpec::new(APIC, &[0; 8]))
        .table(TableSpec::fadt())
        .build();
    let apic = fw.address_of(APIC).unwrap();
    let fadt_at = fw.address_of(Signature::FADT).unwrap();

    let mut tables = AcpiTables::new();
    tables.parse(&mut fw.memory, &mut fw.ranges).unwrap();

    // region ends right where the FADT starts
    let region = PhysSpan::new(apic, usize::try_from(fadt_at - apic).unwrap());
    let moved = tables
        .clear_region(&mut fw.memory, &mut fw.ranges, region)
        .unwrap();
    assert_eq!(moved, 1);
    assert_eq!(&fw.memory.read_array::<4>(fadt_at).unwrap(), b"FACP");
    assert_eq!(fw.memory.read_u32(apic).unwrap(), 0);
    assert_eq!(
        tables.root(RootKind::Xsdt).find_slot(&fw.memory, APIC).unwrap().map(|slot| {
            tables.root(RootKind::Xsdt).read_slot(&fw.memory, slot).unwrap()
        }),
        Some(0x1F_FFD0)
    );
}

#[test]
fn discovery_steps_expose_their_state() {
    let mut fw = FirmwareBuilder::new()
        .rsdt()
        .xsdt()
        .gap(XSDT_STAGING_LEN)
        .table(TableSpec::fadt())
        .build();

    let mut tables = AcpiTables::new();
    assert_eq!(tables.state(), DiscoveryState::SearchingRsdp);

    let rsdp = tables.locate_rsdp(&fw.memory).unwrap();
    assert_eq!(rsdp.address, fw.rsdp);
    assert_eq!(tables.state(), DiscoveryState::HaveRsdp);
    assert!(!tables.is_parsed());

    assert_eq!(
        tables
            .parse_root_table(&mut fw.memory, &mut fw.ranges, RootKind::Xsdt)
            .unwrap(),
        1
    );
    assert_eq!(tables.state(), DiscoveryState::ParsingRootTables);
    assert!(!tables.is_parsed());

    assert_eq!(tables.select_root(), Ok(RootKind::Xsdt));
    assert_eq!(tables.state(), DiscoveryState::HaveRootTable);
    assert!(tables.is_parsed());

    tables.parse(&mut fw.memory, &mut fw.ranges).unwrap();
    assert_eq!(tables.state(), DiscoveryState::Done);
}

#[test]
fn select_root_without_root_tables_fails() {
    let fw = FirmwareBuilder::new().xsdt().build();
    let mut tables = AcpiTables::new();
    tables.locate_rsdp(&fw.memory).unwrap();
    assert_eq!(
        tables.select_root(),
        Err(AcpiError::TableNotFound(Signature::XSDT))
    );
    assert_eq!(tables.state(), DiscoveryState::HaveRsdp);
}

#[test]
fn rsdp_behind_the_xsdt_is_never_overwritten() {
    let mut fw = FirmwareBuilder::new()
        .xsdt()
        .gap(XSDT_STAGING_LEN)
        .table(TableSpec::fadt())
        .build();
    // 44 bytes at 0xE0000; the RSDP at 0xE0040 lies in the bytes past it
    let low_xsdt = 0xE_0000;
    let fadt = fw.address_of(Signature::FADT).unwrap();
    move_xsdt(&mut fw.memory, low_xsdt, fadt);
    let anchor = PhysSpan::new(fw.rsdp, 36);
    let original = fw.memory.slice(anchor).unwrap().to_vec();
    write_table(&mut fw.memory, SCRATCH, Signature::SSDT, b"extra");

    let mut tables = AcpiTables::new();
    tables.parse(&mut fw.memory, &mut fw.ranges).unwrap();
    assert_eq!(tables.root(RootKind::Xsdt).address(), low_xsdt);
    assert_eq!(tables.root(RootKind::Xsdt).staging_end(), None);

    for _ in 0..4 {
        assert_eq!(
            tables.insert_table(&mut fw.memory, &mut fw.ranges, SCRATCH),
            Err(AcpiError::NoStagingSpace(RootKind::Xsdt))
        );
    }
    assert_eq!(fw.memory.slice(anchor).unwrap(), original.as_slice());
    assert_eq!(
        tables.root(RootKind::Xsdt).length(&fw.memory).unwrap(),
        u32::try_from(HEADER_LEN + 8).unwrap()
    );

    let mut again = AcpiTables::new();
    again.parse(&mut fw.memory, &mut fw.ranges).unwrap();
    assert_eq!(again.rsdp().unwrap().address, fw.rsdp);
    assert_eq!(again.root(RootKind::Xsdt).address(), low_xsdt);
}

#[test]
fn usable_memory_behind_the_xsdt_is_not_claimed() {
    let mut fw = FirmwareBuilder::new()
        .xsdt()
        .gap(XSDT_STAGING_LEN)
        .table(TableSpec::fadt())
        .build();
    // the XSDT ends exactly where usable memory begins
    let edge = 0x10_0000 - (HEADER_LEN + 8) as u64;
    let fadt = fw.address_of(Signature::FADT).unwrap();
    move_xsdt(&mut fw.memory, edge, fadt);
    fw.ranges = E820Map::from_firmware(&[
        MemoryRange::new(0xE_0000, 0x2_0000, RangeType::Reserved),
        MemoryRange::new(0x10_0000, 0x100, RangeType::Usable),
    ])
    .unwrap();
    write_table(&mut fw.memory, SCRATCH, Signature::SSDT, b"extra");

    let mut tables = AcpiTables::new();
    tables.parse(&mut fw.memory, &mut fw.ranges).unwrap();
    assert_eq!(tables.root(RootKind::Xsdt).staging_end(), None);

    // the allocator hands out the bytes right behind the XSDT
    let fresh = fw.ranges.allocate(0x100, RangeType::AcpiNvs).unwrap();
    assert_eq!(fresh, 0x10_0000);
    let block = PhysSpan::new(fresh, 0x100);
    fw.memory.fill(block, 0xA5).unwrap();

    assert_eq!(
        tables.insert_table(&mut fw.memory, &mut fw.ranges, SCRATCH),
        Err(AcpiError::NoStagingSpace(RootKind::Xsdt))
    );
    assert!(fw.memory.slice(block).unwrap().iter().all(|&b| b == 0xA5));
}

#[test]
fn claimed_staging_area_stays_out_of_allocations() {
    let mut fw = FirmwareBuilder::new()
        .xsdt()
        .table(TableSpec::ssdt(b"relocate me"))
        .gap(XSDT_STAGING_LEN)
        .table(TableSpec::fadt())
        .build();
    let xsdt = fw.xsdt.unwrap();

    let mut tables = AcpiTables::new();
    tables.parse(&mut fw.memory, &mut fw.ranges).unwrap();
    let start = xsdt + u64::from(tables.root(RootKind::Xsdt).length(&fw.memory).unwrap());
    let end = tables.root(RootKind::Xsdt).staging_end().unwrap();
    assert_eq!(end - start, XSDT_STAGING_LEN as u64);
    let claimed = MemoryRange::new(start, end - start, RangeType::Reserved);

    let mut handed_out = vec![*tables.root(RootKind::Xsdt).entries().first().unwrap()];
    while let Ok(address) = fw.ranges.allocate_aligned(0x1_0000, 16, RangeType::AcpiNvs) {
        handed_out.push(address);
    }
    assert!(handed_out.len() > 1);
    for address in handed_out {
        assert!(!claimed.contains(address), "{address:#x} is in the staging area");
    }
    assert!(
        fw.ranges
            .iter()
            .filter(|r| r.is_usable())
            .all(|r| !r.overlaps(&claimed))
    );
}
