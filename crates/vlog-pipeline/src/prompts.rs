//! Prompt construction.
//!
//! Analysis prompts are chosen by [`PromptMode`]; durations and overlap come
//! from the planned window, never from caller-supplied numbers. Refinement,
//! title and memory prompts work on refined window texts only.

use std::collections::BTreeMap;

use vlog_models::{Language, PromptMode, Scenario, UserMemory};

/// Separator placed between refined window texts.
pub const RESULT_SEPARATOR: &str = "\n\n---\n\n";

/// Characters of joined results submitted for title generation.
pub const TITLE_INPUT_CHARS: usize = 2000;

/// Characters of joined results submitted for memory extraction.
pub const MEMORY_INPUT_CHARS: usize = 3000;

const MEMORY_SCHEMA: &str = r#"{
  "habits": {
    "programming_languages": [],
    "tools": [],
    "coding_style": []
  },
  "knowledge": {
    "expertise": [],
    "learning": [],
    "gaps": []
  },
  "behavior_patterns": {
    "workflows": [],
    "problem_solving": [],
    "project_types": []
  }
}"#;

/// Join refined texts and cut the result to `max_chars` characters.
pub fn join_results(texts: &[String], max_chars: usize, language: Language) -> String {
    let joined = texts.join(RESULT_SEPARATOR);
    if joined.chars().count() <= max_chars {
        return joined;
    }
    let mut truncated: String = joined.chars().take(max_chars).collect();
    truncated.push_str(match language {
        Language::Zh => "\n...(内容过长,已截断)",
        Language::En => "\n...(truncated)",
    });
    truncated
}

/// Source of every prompt the pipeline sends.
pub trait PromptBuilder: Send + Sync {
    /// Analysis prompt for one backend call.
    ///
    /// `duration` is the actual length of the analyzed media, `overlap` the
    /// footage shared with the previous window and `context` that window's
    /// refined text. `context` is ignored outside `SubsequentWindow`.
    fn analysis(
        &self,
        mode: PromptMode,
        duration: f64,
        overlap: f64,
        context: Option<&str>,
        memory: &UserMemory,
    ) -> String;

    /// Editing-pass prompt for a window's raw analysis.
    fn refinement(
        &self,
        raw: &str,
        video_duration: f64,
        metadata: &BTreeMap<String, String>,
        memory: &UserMemory,
    ) -> String;

    /// Title prompt over all refined window texts.
    fn title(&self, refined: &[String], memory: &UserMemory) -> String;

    /// Memory-extraction prompt comparing results with the current profile.
    fn memory_extraction(&self, refined: &[String], current: &UserMemory) -> String;
}

/// Built-in `zh`/`en` prompts with per-scenario hints.
#[derive(Debug, Clone)]
pub struct DefaultPromptBuilder {
    language: Language,
    scenario: Scenario,
    include_scenario_hint: bool,
}

impl DefaultPromptBuilder {
    pub fn new(language: Language, scenario: Scenario) -> Self {
        Self {
            language,
            scenario,
            include_scenario_hint: true,
        }
    }

    pub fn with_scenario_hint(mut self, include: bool) -> Self {
        self.include_scenario_hint = include;
        self
    }

    pub fn language(&self) -> Language {
        self.language
    }
}

impl PromptBuilder for DefaultPromptBuilder {
    fn analysis(
        &self,
        mode: PromptMode,
        duration: f64,
        overlap: f64,
        context: Option<&str>,
        memory: &UserMemory,
    ) -> String {
        let mut prompt = match (mode, self.language) {
            (PromptMode::Full, Language::Zh) => format!(
                "描述这段时长约{:.0}秒的完整视频, 帮我记录其中的活动.\n",
                duration
            ),
            (PromptMode::Full, Language::En) => format!(
                "Describe this complete video of about {:.0} seconds and help me record the activity in it.\n",
                duration
            ),
            (PromptMode::FirstWindow, Language::Zh) => format!(
                "描述这段时长约{:.0}秒的视频片段, 帮我记录其中的活动.\n",
                duration
            ),
            (PromptMode::FirstWindow, Language::En) => format!(
                "Describe this video segment of about {:.0} seconds and help me record the activity in it.\n",
                duration
            ),
            (PromptMode::SubsequentWindow, Language::Zh) => format!(
                "继续分析视频的下一个片段 (约{:.0}秒).\n\n**前文记录**:\n{}\n\n当前片段与前文重叠约{:.0}秒, 重点描述新出现的动作, 前文动作的延续只需简要说明.\n",
                duration,
                context.unwrap_or_default(),
                overlap
            ),
            (PromptMode::SubsequentWindow, Language::En) => format!(
                "Continue with the next video segment (about {:.0} seconds).\n\n**Previously recorded**:\n{}\n\nThis segment overlaps the previous one by about {:.0} seconds. Focus on new actions and only briefly note continuations.\n",
                duration,
                context.unwrap_or_default(),
                overlap
            ),
        };

        prompt.push_str(self.requirements());
        if self.include_scenario_hint {
            prompt.push_str(self.scenario_hint());
        }
        if let Some(context) = self.memory_context(memory) {
            prompt.push_str(&context);
        }
        prompt.push_str(self.output_format());
        prompt
    }

    fn refinement(
        &self,
        raw: &str,
        video_duration: f64,
        metadata: &BTreeMap<String, String>,
        memory: &UserMemory,
    ) -> String {
        let mut meta = match self.language {
            Language::Zh => format!("- 视频总长度: {:.2}秒\n", video_duration),
            Language::En => format!("- Total video duration: {:.2} seconds\n", video_duration),
        };
        for (key, value) in metadata {
            meta.push_str(&format!("- {}: {}\n", key, value));
        }
        let memory_context = self.memory_context(memory).unwrap_or_default();

        match self.language {
            Language::Zh => format!(
                "你负责审校一段AI生成的视频活动记录.\n\n\
                 只修复明显错误: 时间顺序或操作步骤写错, 工具识别错误, 因果颠倒, 前后矛盾, 语病, Markdown格式错误.\n\
                 不要添加原文没有的信息, 不要改变写作风格和详细程度, 不要删除重要细节.\n\n\
                 **视频元数据**:\n{}{}\n**原始记录**:\n{}\n\n\
                 只输出修复后的记录, 不要加任何前缀. 没有明显错误时原样输出.",
                meta, memory_context, raw
            ),
            Language::En => format!(
                "You are reviewing an AI-generated activity record of a video.\n\n\
                 Fix only obvious errors: wrong ordering or operation steps, misidentified tools, reversed cause and effect, contradictions, grammar, broken Markdown.\n\
                 Do not add information that is not in the record, do not change its style or level of detail, and do not drop important details.\n\n\
                 **Video metadata**:\n{}{}\n**Raw record**:\n{}\n\n\
                 Output only the corrected record with no prefix. If nothing needs fixing, output it unchanged.",
                meta, memory_context, raw
            ),
        }
    }

    fn title(&self, refined: &[String], memory: &UserMemory) -> String {
        let results = join_results(refined, TITLE_INPUT_CHARS, self.language);
        let memory_context = self.memory_context(memory).unwrap_or_default();

        match self.language {
            Language::Zh => format!(
                "根据下面的视频活动记录生成一个标题.\n\n\
                 要求: 不超过10个字符(汉字、字母、数字都计入), 准确反映核心内容, 可以使用英文或中英混合.\n\
                 只输出标题本身, 不要解释、标点或前缀. 例如: Python爬虫, Docker配置, 手工木桌.\n{}\n\
                 **视频分析结果**:\n{}",
                memory_context, results
            ),
            Language::En => format!(
                "Generate a title for the video activity record below.\n\n\
                 Requirements: at most 10 characters (letters, digits and CJK characters all count), accurate to the core content.\n\
                 Output only the title, with no explanation, punctuation or prefix. Examples: Python scraper, Docker setup, Wood table.\n{}\n\
                 **Video analysis results**:\n{}",
                memory_context, results
            ),
        }
    }

    fn memory_extraction(&self, refined: &[String], current: &UserMemory) -> String {
        let results = join_results(refined, MEMORY_INPUT_CHARS, self.language);
        let current = current.to_prompt_json().unwrap_or_else(|| {
            match self.language {
                Language::Zh => "暂无",
                Language::En => "None",
            }
            .to_string()
        });

        match self.language {
            Language::Zh => format!(
                "从视频活动记录中提取用户画像: 习惯和偏好(habits), 知识水平(knowledge), 行为模式(behavior_patterns).\n\n\
                 只提取当前记忆中没有的新信息; 只基于实际观察到的行为; 忽略偶发行为, 关注反复出现的模式.\n\n\
                 **当前用户记忆**:\n{}\n\n**视频分析结果**:\n{}\n\n\
                 只输出如下结构的JSON, 没有新信息的类别留空:\n{}",
                current, results, MEMORY_SCHEMA
            ),
            Language::En => format!(
                "Extract a user profile from the video activity record: habits and preferences (habits), knowledge level (knowledge) and behavior patterns (behavior_patterns).\n\n\
                 Only report information missing from the current memory, based on observed behavior. Ignore one-off actions and focus on recurring patterns.\n\n\
                 **Current user memory**:\n{}\n\n**Video analysis results**:\n{}\n\n\
                 Output only JSON with this structure, leaving categories without new information empty:\n{}",
                current, results, MEMORY_SCHEMA
            ),
        }
    }

}

impl DefaultPromptBuilder {
    fn requirements(&self) -> &'static str {
        match self.language {
            Language::Zh => "\n要求:\n1. 只记录视频中实际出现的事实, 不要为了格式编造内容\n2. 重点关注具体操作、使用的工具和界面、关键动作和结果\n",
            Language::En => "\nRequirements:\n1. Record only what actually appears in the video, never invent content to fit the format\n2. Focus on concrete actions, tools and interfaces used, key operations and their results\n",
        }
    }

    fn output_format(&self) -> &'static str {
        match self.language {
            Language::Zh => "\n输出格式: 直接返回Markdown文本, 不要用代码块包裹. 每个关键时刻用 `#### [mm:ss] 标题` 开头, 记录屏幕状态和操作. 使用中文输出.",
            Language::En => "\nOutput format: return Markdown directly, without a code block. Start each key moment with `#### [mm:ss] Heading` and record the screen state and actions. Write in English.",
        }
    }

    fn scenario_hint(&self) -> &'static str {
        match (self.scenario, self.language) {
            (Scenario::Programming, Language::Zh) => "3. 编程场景: 记录文件名、函数名、执行的命令和报错信息\n",
            (Scenario::Programming, Language::En) => "3. Programming: note file and function names, commands run and error messages\n",
            (Scenario::Crafts, Language::Zh) => "3. 手工场景: 记录材料、工具和每一步的手法\n",
            (Scenario::Crafts, Language::En) => "3. Crafts: note materials, tools and the technique of each step\n",
            (Scenario::Teaching, Language::Zh) => "3. 教学场景: 记录讲解的知识点、板书和示例\n",
            (Scenario::Teaching, Language::En) => "3. Teaching: note the concepts explained, board content and examples\n",
            (Scenario::General, Language::Zh) => "3. 记录活动的目标、过程和结果\n",
            (Scenario::General, Language::En) => "3. Note the goal, progress and outcome of the activity\n",
        }
    }

    fn memory_context(&self, memory: &UserMemory) -> Option<String> {
        let json = memory.to_prompt_json()?;
        Some(match self.language {
            Language::Zh => format!("\n**用户背景信息**:\n{}\n", json),
            Language::En => format!("\n**User background**:\n{}\n", json),
        })
    }
}
