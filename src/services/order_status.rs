//! Derived production order status.
//!
//! Nothing here is persisted. The status shown for a production order is recomputed from its
//! children on every read: showroom first, then assembly, then purchase, then the bare order.

use serde::Serialize;

use crate::entities::{
    assembly_order::AssemblyStatus, production_order::ProductionStatus,
    purchase_order::PurchaseStatus, showroom_product::ShowroomStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedStatus {
    pub text: &'static str,
    pub department: &'static str,
    pub color: &'static str,
    pub progress: i32,
}

impl DerivedStatus {
    const fn new(text: &'static str, department: &'static str, color: &'static str, progress: i32) -> Self {
        Self {
            text,
            department,
            color,
            progress,
        }
    }
}

/// Snapshot of the child rows that feed the derivation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusInputs {
    pub purchase: Option<PurchaseStatus>,
    pub assembly: Option<(AssemblyStatus, i32)>,
    pub showroom: Option<ShowroomStatus>,
}

fn assembly_progress(progress: i32) -> i32 {
    40 + progress.clamp(0, 100) * 35 / 100
}

pub fn derive_status(production: ProductionStatus, inputs: StatusInputs) -> DerivedStatus {
    if production == ProductionStatus::Cancelled {
        return DerivedStatus::new("Cancelled", "Production", "red", 0);
    }

    match inputs.showroom {
        Some(ShowroomStatus::Sold) => return DerivedStatus::new("Sold Out", "Sales", "green", 100),
        Some(ShowroomStatus::Available) => {
            return DerivedStatus::new("In Showroom", "Showroom", "teal", 90)
        }
        None => {}
    }

    if let Some((status, progress)) = inputs.assembly {
        match status {
            AssemblyStatus::SentToShowroom => {
                return DerivedStatus::new("Sent to Showroom", "Assembly", "teal", 85)
            }
            AssemblyStatus::Completed => {
                return DerivedStatus::new("Assembly Completed", "Assembly", "green", 80)
            }
            AssemblyStatus::Rework => {
                return DerivedStatus::new("Rework Required", "Assembly", "red", 60)
            }
            AssemblyStatus::InProgress => {
                return DerivedStatus::new(
                    "Assembly In Progress",
                    "Assembly",
                    "blue",
                    assembly_progress(progress),
                )
            }
            AssemblyStatus::Paused => {
                return DerivedStatus::new(
                    "Assembly Paused",
                    "Assembly",
                    "orange",
                    assembly_progress(progress),
                )
            }
            AssemblyStatus::Pending => {}
        }
    }

    match inputs.purchase {
        Some(PurchaseStatus::StoreAllocated) => {
            DerivedStatus::new("Materials Allocated", "Store", "green", 35)
        }
        Some(PurchaseStatus::FinanceApproved) => {
            DerivedStatus::new("Purchase Approved", "Finance", "blue", 30)
        }
        Some(PurchaseStatus::PartiallyAllocated) => {
            DerivedStatus::new("Partially Allocated", "Store", "yellow", 25)
        }
        Some(PurchaseStatus::InsufficientStock) => {
            DerivedStatus::new("Awaiting Purchase", "Purchase", "orange", 20)
        }
        Some(PurchaseStatus::FinanceRejected) => {
            DerivedStatus::new("Purchase Rejected", "Finance", "red", 15)
        }
        Some(PurchaseStatus::Pending) => {
            DerivedStatus::new("Stock Check Pending", "Store", "gray", 10)
        }
        Some(PurchaseStatus::Cancelled) | None => {
            DerivedStatus::new("Order Created", "Production", "gray", 5)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StatusInputs::default(), "Order Created", 5)]
    #[case(StatusInputs { purchase: Some(PurchaseStatus::Pending), ..Default::default() }, "Stock Check Pending", 10)]
    #[case(StatusInputs { purchase: Some(PurchaseStatus::FinanceRejected), ..Default::default() }, "Purchase Rejected", 15)]
    #[case(StatusInputs { purchase: Some(PurchaseStatus::InsufficientStock), ..Default::default() }, "Awaiting Purchase", 20)]
    #[case(StatusInputs { purchase: Some(PurchaseStatus::PartiallyAllocated), ..Default::default() }, "Partially Allocated", 25)]
    #[case(StatusInputs { purchase: Some(PurchaseStatus::FinanceApproved), ..Default::default() }, "Purchase Approved", 30)]
    #[case(StatusInputs { purchase: Some(PurchaseStatus::StoreAllocated), assembly: Some((AssemblyStatus::Pending, 0)), showroom: None }, "Materials Allocated", 35)]
    #[case(StatusInputs { purchase: Some(PurchaseStatus::StoreAllocated), assembly: Some((AssemblyStatus::InProgress, 40)), showroom: None }, "Assembly In Progress", 54)]
    #[case(StatusInputs { purchase: Some(PurchaseStatus::StoreAllocated), assembly: Some((AssemblyStatus::Paused, 100)), showroom: None }, "Assembly Paused", 75)]
    #[case(StatusInputs { purchase: Some(PurchaseStatus::StoreAllocated), assembly: Some((AssemblyStatus::Rework, 0)), showroom: None }, "Rework Required", 60)]
    #[case(StatusInputs { purchase: Some(PurchaseStatus::StoreAllocated), assembly: Some((AssemblyStatus::Completed, 100)), showroom: None }, "Assembly Completed", 80)]
    #[case(StatusInputs { purchase: Some(PurchaseStatus::StoreAllocated), assembly: Some((AssemblyStatus::SentToShowroom, 100)), showroom: None }, "Sent to Showroom", 85)]
    #[case(StatusInputs { purchase: Some(PurchaseStatus::StoreAllocated), assembly: Some((AssemblyStatus::SentToShowroom, 100)), showroom: Some(ShowroomStatus::Available) }, "In Showroom", 90)]
    #[case(StatusInputs { purchase: Some(PurchaseStatus::StoreAllocated), assembly: Some((AssemblyStatus::SentToShowroom, 100)), showroom: Some(ShowroomStatus::Sold) }, "Sold Out", 100)]
    fn derives_text_and_progress(
        #[case] inputs: StatusInputs,
        #[case] text: &str,
        #[case] progress: i32,
    ) {
        let status = derive_status(ProductionStatus::Created, inputs);
        assert_eq!(status.text, text);
        assert_eq!(status.progress, progress);
    }

    #[test]
    fn cancellation_overrides_children() {
        let inputs = StatusInputs {
            purchase: Some(PurchaseStatus::StoreAllocated),
            assembly: Some((AssemblyStatus::Completed, 100)),
            showroom: None,
        };
        let status = derive_status(ProductionStatus::Cancelled, inputs);
        assert_eq!(status.text, "Cancelled");
        assert_eq!(status.color, "red");
        assert_eq!(status.progress, 0);
    }

    #[test]
    fn progress_is_monotonic_along_the_happy_path() {
        let path = [
            StatusInputs::default(),
            StatusInputs { purchase: Some(PurchaseStatus::Pending), ..Default::default() },
            StatusInputs { purchase: Some(PurchaseStatus::InsufficientStock), ..Default::default() },
            StatusInputs { purchase: Some(PurchaseStatus::FinanceApproved), ..Default::default() },
            StatusInputs { purchase: Some(PurchaseStatus::StoreAllocated), ..Default::default() },
            StatusInputs { purchase: Some(PurchaseStatus::StoreAllocated), assembly: Some((AssemblyStatus::InProgress, 50)), showroom: None },
            StatusInputs { purchase: Some(PurchaseStatus::StoreAllocated), assembly: Some((AssemblyStatus::Completed, 100)), showroom: None },
            StatusInputs { purchase: Some(PurchaseStatus::StoreAllocated), assembly: Some((AssemblyStatus::SentToShowroom, 100)), showroom: Some(ShowroomStatus::Available) },
            StatusInputs { purchase: Some(PurchaseStatus::StoreAllocated), assembly: Some((AssemblyStatus::SentToShowroom, 100)), showroom: Some(ShowroomStatus::Sold) },
        ];
        let progress: Vec<i32> = path
            .iter()
            .map(|i| derive_status(ProductionStatus::Created, *i).progress)
            .collect();
        assert!(progress.windows(2).all(|w| w[0] < w[1]), "{:?}", progress);
    }
}
