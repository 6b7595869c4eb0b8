//! Image source detection for instance requests.
//!
//! An instance boots either from a whole-disk image (optionally verified by a
//! checksum) or from an explicit kernel/ramdisk pair. The two methods are
//! mutually exclusive; requests that mix them or supply only half of a pair
//! are rejected here, both during batch validation and again immediately
//! before provisioning.

use serde::Serialize;
use thiserror::Error;

/// Resolved image acquisition method for one instance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    /// Whole-disk image, optionally accompanied by a checksum reference.
    Disk {
        /// Image identifier or URL.
        image: String,
        /// Optional checksum value or checksum-file URL.
        #[serde(skip_serializing_if = "Option::is_none")]
        checksum: Option<String>,
    },
    /// Separate kernel and ramdisk images for partition-style booting.
    KernelRamdisk {
        /// Kernel image identifier or URL.
        kernel: String,
        /// Ramdisk image identifier or URL.
        ramdisk: String,
    },
}

impl ImageSource {
    /// Determines the image source from the four request fields.
    ///
    /// Exactly one method must be determinable: a whole-disk `image` (with
    /// optional `checksum`) or a complete `kernel`/`ramdisk` pair. A checksum
    /// only applies to whole-disk images, so combining it with a pair fails.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when no method or an inconsistent mix of
    /// fields is supplied.
    pub fn detect(
        image: Option<&str>,
        checksum: Option<&str>,
        kernel: Option<&str>,
        ramdisk: Option<&str>,
    ) -> Result<Self, SourceError> {
        let disk_image = non_empty(image);
        let disk_checksum = non_empty(checksum);

        match (non_empty(kernel), non_empty(ramdisk)) {
            (Some(kernel_image), Some(ramdisk_image)) => {
                if disk_checksum.is_some() {
                    return Err(SourceError::ChecksumWithPair);
                }
                Ok(Self::KernelRamdisk {
                    kernel: kernel_image.to_owned(),
                    ramdisk: ramdisk_image.to_owned(),
                })
            }
            (Some(_), None) => Err(SourceError::IncompletePair {
                missing: "image_ramdisk",
            }),
            (None, Some(_)) => Err(SourceError::IncompletePair {
                missing: "image_kernel",
            }),
            (None, None) => {
                let Some(found) = disk_image else {
                    return Err(SourceError::Missing);
                };
                Ok(Self::Disk {
                    image: found.to_owned(),
                    checksum: disk_checksum.map(str::to_owned),
                })
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}

/// Errors raised while determining the image source of a request.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SourceError {
    /// Raised when neither a whole-disk image nor a kernel/ramdisk pair was
    /// supplied.
    #[error("no image source: supply image (with optional image_checksum) or both image_kernel and image_ramdisk")]
    Missing,
    /// Raised when only one half of the kernel/ramdisk pair was supplied.
    #[error("incomplete kernel/ramdisk pair: {missing} is missing")]
    IncompletePair {
        /// Name of the absent field.
        missing: &'static str,
    },
    /// Raised when a checksum accompanies a kernel/ramdisk pair.
    #[error("image_checksum applies to whole-disk images and cannot be combined with a kernel/ramdisk pair")]
    ChecksumWithPair,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn detects_whole_disk_image() {
        let source = ImageSource::detect(Some("golden"), None, None, None)
            .expect("whole-disk image should resolve");
        assert_eq!(
            source,
            ImageSource::Disk {
                image: String::from("golden"),
                checksum: None,
            }
        );
    }

    #[rstest]
    fn detects_whole_disk_image_with_checksum() {
        let source = ImageSource::detect(
            Some("http://example.test/img.qcow2"),
            Some("http://example.test/img.sha256"),
            None,
            None,
        )
        .expect("checksummed image should resolve");
        assert_eq!(
            source,
            ImageSource::Disk {
                image: String::from("http://example.test/img.qcow2"),
                checksum: Some(String::from("http://example.test/img.sha256")),
            }
        );
    }

    #[rstest]
    fn detects_kernel_ramdisk_pair() {
        let source = ImageSource::detect(None, None, Some("vmlinuz"), Some("initrd"))
            .expect("complete pair should resolve");
        assert_eq!(
            source,
            ImageSource::KernelRamdisk {
                kernel: String::from("vmlinuz"),
                ramdisk: String::from("initrd"),
            }
        );
    }

    #[rstest]
    fn pair_takes_precedence_over_defaulted_image() {
        // Validation defaults `image` before resolution, so a pair-booting
        // request still carries an image name. The pair wins.
        let source = ImageSource::detect(Some("golden"), None, Some("vmlinuz"), Some("initrd"))
            .expect("pair with defaulted image should resolve");
        assert!(matches!(source, ImageSource::KernelRamdisk { .. }));
    }

    #[rstest]
    #[case(Some("vmlinuz"), None, "image_ramdisk")]
    #[case(None, Some("initrd"), "image_kernel")]
    fn rejects_incomplete_pair(
        #[case] kernel: Option<&str>,
        #[case] ramdisk: Option<&str>,
        #[case] expected_missing: &'static str,
    ) {
        let err = ImageSource::detect(None, None, kernel, ramdisk)
            .expect_err("half a pair should be rejected");
        assert_eq!(
            err,
            SourceError::IncompletePair {
                missing: expected_missing
            }
        );
    }

    #[rstest]
    fn rejects_checksum_with_pair() {
        let err = ImageSource::detect(None, Some("abc123"), Some("vmlinuz"), Some("initrd"))
            .expect_err("checksum alongside a pair should be rejected");
        assert_eq!(err, SourceError::ChecksumWithPair);
    }

    #[rstest]
    #[case(None, None)]
    #[case(Some("   "), None)]
    #[case(None, Some("abc123"))]
    fn rejects_missing_source(#[case] image: Option<&str>, #[case] checksum: Option<&str>) {
        let err = ImageSource::detect(image, checksum, None, None)
            .expect_err("a request without any source should be rejected");
        assert_eq!(err, SourceError::Missing);
    }

    #[rstest]
    fn serializes_with_source_kind_tag() {
        let source = ImageSource::Disk {
            image: String::from("golden"),
            checksum: None,
        };
        let rendered = serde_json::to_value(&source).expect("source should serialize");
        assert_eq!(rendered["type"], "disk");
        assert_eq!(rendered["image"], "golden");
        assert!(rendered.get("checksum").is_none());
    }
}
