//! Vulkan valid usage ids referenced by decoration diagnostics.

/// Full tag for a `VUID-StandaloneSpirv-*` number, `None` if the number is not
/// one this validator reports.
pub fn vuid_tag(number: u32) -> Option<&'static str> {
    Some(match number {
        4636 => "VUID-StandaloneSpirv-None-04636",
        4669 => "VUID-StandaloneSpirv-GLSLShared-04669",
        4670 => "VUID-StandaloneSpirv-Flat-04670",
        4675 => "VUID-StandaloneSpirv-FPRoundingMode-04675",
        4744 => "VUID-StandaloneSpirv-Flat-04744",
        4919 => "VUID-StandaloneSpirv-Location-04919",
        4920 => "VUID-StandaloneSpirv-Component-04920",
        4921 => "VUID-StandaloneSpirv-Component-04921",
        4922 => "VUID-StandaloneSpirv-Component-04922",
        4923 => "VUID-StandaloneSpirv-Component-04923",
        4924 => "VUID-StandaloneSpirv-Component-04924",
        6201 => "VUID-StandaloneSpirv-Flat-06201",
        6202 => "VUID-StandaloneSpirv-Flat-06202",
        6672 => "VUID-StandaloneSpirv-Location-06672",
        6674 => "VUID-StandaloneSpirv-OpEntryPoint-06674",
        6675 => "VUID-StandaloneSpirv-PushConstant-06675",
        6676 => "VUID-StandaloneSpirv-Uniform-06676",
        6677 => "VUID-StandaloneSpirv-UniformConstant-06677",
        6678 => "VUID-StandaloneSpirv-InputAttachmentIndex-06678",
        6777 => "VUID-StandaloneSpirv-PerVertexKHR-06777",
        6778 => "VUID-StandaloneSpirv-Input-06778",
        7703 => "VUID-StandaloneSpirv-Component-07703",
        9658 => "VUID-StandaloneSpirv-OpEntryPoint-09658",
        9659 => "VUID-StandaloneSpirv-OpEntryPoint-09659",
        _ => return None,
    })
}
