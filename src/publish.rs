//! Page layout for a processed batch and the seam to the page host.
use anyhow::Result;
use async_trait::async_trait;

use crate::assignment::AssignmentRouter;
use crate::model::{PrayerRecord, ProcessedBatch};
use crate::notion::blocks::{callout, divider, heading_1, toggle, BlockNode};
use crate::split::SplitError;

pub const COMMON_PRAYERS_HEADING: &str = "✝️ 공통 기도제목";

/// Replaces everything below a marker heading on the target page.
#[async_trait]
pub trait SectionPublisher: Send + Sync {
    async fn replace_section(&self, marker: &str, content: &[BlockNode]) -> Result<()>;
}

/// Callout text for one record.
pub fn record_text(record: &PrayerRecord) -> String {
    format!(
        "👤 제출자: {}\n🙏 구도자: {} ({}, {})\n👥 관계: {}\n📝 기도제목:\n{}",
        record.submitter,
        record.target_name,
        record.gender,
        record.age,
        record.relationship,
        record.prayer_content
    )
}

/// Full block tree for the managed section. Managers appear in table order;
/// submitters without records are left out, managers never are.
pub fn layout(
    batch: &ProcessedBatch,
    router: &AssignmentRouter,
    common_prayers: Option<&str>,
) -> Result<Vec<BlockNode>, SplitError> {
    let mut nodes = vec![
        BlockNode::leaf(callout(
            &format!(
                "마지막 업데이트: {}",
                batch.last_updated.format("%Y-%m-%d %H:%M")
            ),
            "🔄",
            "gray_background",
        )),
        BlockNode::leaf(divider()),
    ];

    if let Some(text) = common_prayers.map(str::trim).filter(|t| !t.is_empty()) {
        nodes.push(BlockNode::leaf(heading_1(COMMON_PRAYERS_HEADING, Some("purple"))));
        nodes.push(BlockNode::leaf(callout(text, "🕊️", "blue_background")));
        nodes.push(BlockNode::leaf(divider()));
    }

    for assignment in router.assignments() {
        let mut submitters = Vec::new();
        for submitter in &assignment.submitters {
            let routed = router.route(
                &assignment.manager,
                submitter,
                batch.records_for(submitter),
            )?;
            if routed.items.is_empty() {
                continue;
            }
            let title = match routed.part {
                Some((idx, count)) => {
                    format!("🙏 {}님의 기도제목 ({}/{})", submitter, idx + 1, count)
                }
                None => format!("🙏 {}님의 기도제목", submitter),
            };
            let callouts = routed
                .items
                .iter()
                .map(|r| BlockNode::leaf(callout(&record_text(r), "✨", "gray_background")))
                .collect();
            submitters.push(BlockNode::with_children(
                toggle(&title, Some("green")),
                callouts,
            ));
        }
        nodes.push(BlockNode::with_children(
            toggle(&format!("📌 {}", assignment.manager), None),
            submitters,
        ));
    }

    Ok(nodes)
}
