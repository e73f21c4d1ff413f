//! System prompt and regression corpus for the command model.
//!
//! The prompt instructs the model to answer with a JSON array of command
//! objects (`a` action, `s` scope, `n` name, `t` type, `q` quantifier,
//! `c` count) and nothing else. The regression corpus pins the contract:
//! every reply a well-behaved model produces must parse cleanly.

use lares_devices::category::CATEGORIES;

/// Assemble the Chinese system prompt driving the command model.
///
/// The category list is injected from the closed taxonomy so prompt and
/// parser can never disagree about valid `t` values.
pub fn default_system_prompt() -> String {
    let mut prompt = String::from("# 智能家居指令解析器\n\n");
    prompt.push_str("你负责把用户的自然语言指令转换成结构化命令。只输出一个 JSON 数组，不要输出任何其他文字。\n\n");

    prompt.push_str("## 输出格式\n\n");
    prompt.push_str("数组中的每个元素是一个对象：\n\n");
    prompt.push_str("```json\n");
    prompt.push_str(r#"{"a": "动作", "s": "范围", "n": "设备名", "t": "类型", "q": "数量词", "c": 2}"#);
    prompt.push_str("\n```\n\n");
    prompt.push_str("- `a`：动作描述，保留用户的原始措辞（如 \"打开\"、\"温度调到26度\"），不要包含 `-` 或 `#`。无法识别为设备指令时填 \"UNKNOWN\"。\n");
    prompt.push_str("- `s`：房间范围。单个房间填字符串，多个房间用数组，全部房间填 \"*\"。排除某房间写 \"!房间名\"，如 [\"*\", \"!卧室\"]。\n");
    prompt.push_str("- `n`：设备名称。用户未提及时填 \"*\"。用户用\"它\"等指代上一个设备时填 \"@last\"。\n");
    prompt.push_str("- `t`：设备类型，必须取自下方类型列表。不确定时填 \"Unknown\"。\n");
    prompt.push_str("- `q`：数量词，one / all / any / except 之一。未提及时填 \"one\"。\n");
    prompt.push_str("- `c`：仅当 q 为 any 且用户给出数量时填正整数，否则省略。\n\n");

    prompt.push_str("## 设备类型\n\n");
    prompt.push_str(&CATEGORIES.join(", "));
    prompt.push_str("\n\n");

    prompt.push_str("## 规则\n\n");
    prompt.push_str("- 一句话包含多个指令时，输出多个对象。\n");
    prompt.push_str("- 与设备控制无关的输入（闲聊、天气、问答），输出 [{\"a\": \"UNKNOWN\"}]。\n");
    prompt.push_str("- 不要编造用户没有说出的设备名或房间名。\n");
    prompt.push_str("- 动作中保留数值与单位，如 \"26度\"、\"50%\"。\n\n");

    prompt.push_str("## 示例\n\n");
    prompt.push_str("用户：打开客厅的主灯\n");
    prompt.push_str("输出：[{\"a\": \"打开\", \"s\": \"客厅\", \"n\": \"主灯\", \"t\": \"Light\", \"q\": \"one\"}]\n\n");
    prompt.push_str("用户：除了卧室，把所有灯都关了\n");
    prompt.push_str("输出：[{\"a\": \"关闭\", \"s\": [\"*\", \"!卧室\"], \"n\": \"*\", \"t\": \"Light\", \"q\": \"except\"}]\n\n");
    prompt.push_str("用户：随便开两盏灯\n");
    prompt.push_str("输出：[{\"a\": \"打开\", \"s\": \"*\", \"n\": \"*\", \"t\": \"Light\", \"q\": \"any\", \"c\": 2}]\n\n");
    prompt.push_str("用户：把它关掉\n");
    prompt.push_str("输出：[{\"a\": \"关闭\", \"s\": \"*\", \"n\": \"@last\", \"t\": \"Unknown\", \"q\": \"one\"}]\n\n");
    prompt.push_str("用户：今天天气怎么样\n");
    prompt.push_str("输出：[{\"a\": \"UNKNOWN\"}]\n");

    prompt
}

/// One pinned utterance-to-wire-format expectation.
#[derive(Debug, Clone, Copy)]
pub struct RegressionCase {
    /// User utterance fed to the model.
    pub utterance: &'static str,
    /// Wire-format reply a well-behaved model produces.
    pub reply: &'static str,
    /// Canonical rendering of every command in the reply, in order.
    pub expected: &'static [&'static str],
    /// Whether parsing the reply is expected to degrade.
    pub degraded: bool,
}

/// The pinned regression corpus.
pub fn regression_cases() -> &'static [RegressionCase] {
    REGRESSION_CASES
}

const REGRESSION_CASES: &[RegressionCase] = &[
    RegressionCase {
        utterance: "打开客厅的主灯",
        reply: r#"[{"a": "打开", "s": "客厅", "n": "主灯", "t": "Light", "q": "one"}]"#,
        expected: &["打开-客厅-主灯#Light#one"],
        degraded: false,
    },
    RegressionCase {
        utterance: "关闭所有灯",
        reply: r#"[{"a": "关闭", "s": "*", "n": "*", "t": "Light", "q": "all"}]"#,
        expected: &["关闭-*-*#Light#all"],
        degraded: false,
    },
    RegressionCase {
        utterance: "除了卧室，把所有灯都关了",
        reply: r#"[{"a": "关闭", "s": ["*", "!卧室"], "n": "*", "t": "Light", "q": "except"}]"#,
        expected: &["关闭-*,!卧室-*#Light#except"],
        degraded: false,
    },
    RegressionCase {
        utterance: "随便开两盏灯",
        reply: r#"[{"a": "打开", "s": "*", "n": "*", "t": "Light", "q": "any", "c": 2}]"#,
        expected: &["打开-*-*#Light#any#2"],
        degraded: false,
    },
    RegressionCase {
        utterance: "打开卧室和书房的灯",
        reply: r#"[{"a": "打开", "s": ["卧室", "书房"], "n": "*", "t": "Light", "q": "all"}]"#,
        expected: &["打开-卧室,书房-*#Light#all"],
        degraded: false,
    },
    RegressionCase {
        utterance: "把空调温度调到26度",
        reply: r#"[{"a": "温度调到26度", "s": "*", "n": "*", "t": "AirConditioner", "q": "one"}]"#,
        expected: &["温度调到26度-*-*#AirConditioner#one"],
        degraded: false,
    },
    RegressionCase {
        utterance: "把亮度调到50%",
        reply: r#"[{"a": "亮度调到50%", "s": "*", "n": "*", "t": "Light", "q": "one"}]"#,
        expected: &["亮度调到50%-*-*#Light#one"],
        degraded: false,
    },
    RegressionCase {
        utterance: "把它关掉",
        reply: r#"[{"a": "关闭", "s": "*", "n": "@last", "t": "Unknown", "q": "one"}]"#,
        expected: &["关闭-*-@last#Unknown#one"],
        degraded: false,
    },
    RegressionCase {
        utterance: "把大白打开",
        reply: r#"[{"a": "打开", "s": "*", "n": "大白", "t": "Unknown", "q": "one"}]"#,
        expected: &["打开-*-大白#Unknown#one"],
        degraded: false,
    },
    RegressionCase {
        utterance: "拉开窗帘",
        reply: r#"[{"a": "拉开", "s": "*", "n": "*", "t": "Blind", "q": "one"}]"#,
        expected: &["拉开-*-*#Blind#one"],
        degraded: false,
    },
    RegressionCase {
        utterance: "电视静音",
        reply: r#"[{"a": "静音", "s": "*", "n": "*", "t": "Television", "q": "one"}]"#,
        expected: &["静音-*-*#Television#one"],
        degraded: false,
    },
    RegressionCase {
        utterance: "把风扇风速调高",
        reply: r#"[{"a": "风速调高", "s": "*", "n": "*", "t": "Fan", "q": "one"}]"#,
        expected: &["风速调高-*-*#Fan#one"],
        degraded: false,
    },
    RegressionCase {
        utterance: "洗衣机开始洗涤",
        reply: r#"[{"a": "开始洗涤", "s": "*", "n": "*", "t": "Washer", "q": "one"}]"#,
        expected: &["开始洗涤-*-*#Washer#one"],
        degraded: false,
    },
    RegressionCase {
        utterance: "打开走廊的插座",
        reply: r#"[{"a": "打开", "s": "走廊", "n": "*", "t": "SmartPlug", "q": "one"}]"#,
        expected: &["打开-走廊-*#SmartPlug#one"],
        degraded: false,
    },
    RegressionCase {
        utterance: "客厅音箱播放音乐",
        reply: r#"[{"a": "播放音乐", "s": "客厅", "n": "*", "t": "NetworkAudio", "q": "one"}]"#,
        expected: &["播放音乐-客厅-*#NetworkAudio#one"],
        degraded: false,
    },
    RegressionCase {
        utterance: "停止给车充电",
        reply: r#"[{"a": "停止充电", "s": "*", "n": "*", "t": "Charger", "q": "one"}]"#,
        expected: &["停止充电-*-*#Charger#one"],
        degraded: false,
    },
    RegressionCase {
        utterance: "打开灯和空调",
        reply: r#"[{"a": "打开", "s": "*", "n": "*", "t": "Light", "q": "one"}, {"a": "打开", "s": "*", "n": "*", "t": "AirConditioner", "q": "one"}]"#,
        expected: &["打开-*-*#Light#one", "打开-*-*#AirConditioner#one"],
        degraded: false,
    },
    RegressionCase {
        utterance: "今天天气怎么样",
        reply: r#"[{"a": "UNKNOWN"}]"#,
        expected: &["UNKNOWN-*-*#Unknown#one"],
        degraded: true,
    },
];
