//! Code signing magics, slot types and flags.

#![allow(missing_docs)]

use bitflags::bitflags;

// =============================================================================
// Blob Magics
// =============================================================================

pub const CSMAGIC_REQUIREMENT: u32 = 0xfade0c00;
pub const CSMAGIC_REQUIREMENTS: u32 = 0xfade0c01;
pub const CSMAGIC_CODEDIRECTORY: u32 = 0xfade0c02;
pub const CSMAGIC_EMBEDDED_SIGNATURE: u32 = 0xfade0cc0;
pub const CSMAGIC_EMBEDDED_SIGNATURE_OLD: u32 = 0xfade0b02;
pub const CSMAGIC_EMBEDDED_ENTITLEMENTS: u32 = 0xfade7171;
pub const CSMAGIC_EMBEDDED_DER_ENTITLEMENTS: u32 = 0xfade7172;
pub const CSMAGIC_DETACHED_SIGNATURE: u32 = 0xfade0cc1;
pub const CSMAGIC_BLOBWRAPPER: u32 = 0xfade0b01;

// =============================================================================
// Slot Types
// =============================================================================

pub const CSSLOT_CODEDIRECTORY: u32 = 0;
pub const CSSLOT_INFOSLOT: u32 = 1;
pub const CSSLOT_REQUIREMENTS: u32 = 2;
pub const CSSLOT_RESOURCEDIR: u32 = 3;
pub const CSSLOT_APPLICATION: u32 = 4;
pub const CSSLOT_ENTITLEMENTS: u32 = 5;
pub const CSSLOT_DER_ENTITLEMENTS: u32 = 7;
pub const CSSLOT_ALTERNATE_CODEDIRECTORIES: u32 = 0x1000;
pub const CSSLOT_ALTERNATE_CODEDIRECTORY_MAX: u32 = 5;
pub const CSSLOT_SIGNATURESLOT: u32 = 0x10000;

/// Returns true for the primary and alternate code directory slots.
pub fn is_code_directory_slot(slot: u32) -> bool {
    slot == CSSLOT_CODEDIRECTORY
        || (CSSLOT_ALTERNATE_CODEDIRECTORIES
            ..CSSLOT_ALTERNATE_CODEDIRECTORIES + CSSLOT_ALTERNATE_CODEDIRECTORY_MAX)
            .contains(&slot)
}

/// Returns a short label for a super blob slot type.
pub fn slot_name(slot: u32) -> &'static str {
    match slot {
        CSSLOT_CODEDIRECTORY => "CodeDirectory",
        CSSLOT_INFOSLOT => "Info.plist",
        CSSLOT_REQUIREMENTS => "Requirements",
        CSSLOT_RESOURCEDIR => "ResourceDirectory",
        CSSLOT_APPLICATION => "Application",
        CSSLOT_ENTITLEMENTS => "Entitlements",
        CSSLOT_DER_ENTITLEMENTS => "DEREntitlements",
        CSSLOT_SIGNATURESLOT => "Signature",
        s if is_code_directory_slot(s) => "AlternateCodeDirectory",
        _ => "Unknown",
    }
}

// =============================================================================
// Code Directory Versions
// =============================================================================

pub const CS_SUPPORTSSCATTER: u32 = 0x20100;
pub const CS_SUPPORTSTEAMID: u32 = 0x20200;
pub const CS_SUPPORTSCODELIMIT64: u32 = 0x20300;
pub const CS_SUPPORTSEXECSEG: u32 = 0x20400;
pub const CS_SUPPORTSRUNTIME: u32 = 0x20500;
pub const CS_SUPPORTSLINKAGE: u32 = 0x20600;

// =============================================================================
// Hash Types
// =============================================================================

pub const CS_HASHTYPE_SHA1: u8 = 1;
pub const CS_HASHTYPE_SHA256: u8 = 2;
pub const CS_HASHTYPE_SHA256_TRUNCATED: u8 = 3;
pub const CS_HASHTYPE_SHA384: u8 = 4;

/// Returns the conventional name of a code directory hash type.
pub fn hash_type_name(hash_type: u8) -> &'static str {
    match hash_type {
        CS_HASHTYPE_SHA1 => "sha1",
        CS_HASHTYPE_SHA256 => "sha256",
        CS_HASHTYPE_SHA256_TRUNCATED => "sha256-truncated",
        CS_HASHTYPE_SHA384 => "sha384",
        _ => "unknown",
    }
}

// =============================================================================
// Flags
// =============================================================================

bitflags! {
    /// Code directory flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CodeSignFlags: u32 {
        const VALID = 0x0000_0001;
        const ADHOC = 0x0000_0002;
        const GET_TASK_ALLOW = 0x0000_0004;
        const INSTALLER = 0x0000_0008;
        const FORCED_LV = 0x0000_0010;
        const INVALID_ALLOWED = 0x0000_0020;
        const HARD = 0x0000_0100;
        const KILL = 0x0000_0200;
        const CHECK_EXPIRATION = 0x0000_0400;
        const RESTRICT = 0x0000_0800;
        const ENFORCEMENT = 0x0000_1000;
        const REQUIRE_LV = 0x0000_2000;
        const ENTITLEMENTS_VALIDATED = 0x0000_4000;
        const NVRAM_UNRESTRICTED = 0x0000_8000;
        const RUNTIME = 0x0001_0000;
        const LINKER_SIGNED = 0x0002_0000;
    }
}

bitflags! {
    /// Executable segment flags (version 0x20400 and later).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExecSegFlags: u64 {
        const MAIN_BINARY = 0x1;
        const ALLOW_UNSIGNED = 0x10;
        const DEBUGGER = 0x20;
        const JIT = 0x40;
        const SKIP_LV = 0x80;
        const CAN_LOAD_CDHASH = 0x100;
        const CAN_EXEC_CDHASH = 0x200;
    }
}
