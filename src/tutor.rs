use std::sync::Arc;

use serde::Serialize;

use crate::catalog::KeywordCatalog;
use crate::db::Database;
use crate::error::{TutorError, TutorResult};
use crate::evaluate::{evaluate_question, NO_PENDING_QUESTION};
use crate::explain::{ConceptExplainer, ConceptExplanation, ConceptReexplanation};
use crate::models::{
    Difficulty, EvaluationResult, GeneratedQuestion, PageHit, QuestionType, TextChunk,
};
use crate::quiz::{LanguageModel, QuestionRequest, QuestionSynthesizer};
use crate::resolver::{enhance_query, KeywordResolver, Resolution, DEFAULT_PAGE_RESULTS};
use crate::retrieval::{Embedder, RetrievalEngine, VectorIndex};
use crate::session::PendingQuestions;

pub const DEFAULT_TOP_K: usize = 5;
const EXPLAIN_TOP_K: usize = 7;

#[derive(Debug, Clone, Serialize)]
pub struct QuizTurn {
    pub question: GeneratedQuestion,
    pub resolution: Resolution,
    pub learner_text: String,
}

pub struct TutorService<E, V, L, P> {
    resolver: KeywordResolver,
    engine: RetrievalEngine<E, V>,
    synthesizer: QuestionSynthesizer<L>,
    pending: P,
    messages: Option<Database>,
    top_k: usize,
}

impl<E, V, L, P> TutorService<E, V, L, P>
where
    E: Embedder,
    V: VectorIndex,
    L: LanguageModel,
    P: PendingQuestions,
{
    pub fn new(
        catalog: Arc<KeywordCatalog>,
        engine: RetrievalEngine<E, V>,
        llm: L,
        pending: P,
    ) -> Self {
        Self {
            resolver: KeywordResolver::new(catalog.clone()),
            engine,
            synthesizer: QuestionSynthesizer::new(llm, catalog),
            pending,
            messages: None,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_message_log(mut self, db: Database) -> Self {
        self.messages = Some(db);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn resolver(&self) -> &KeywordResolver {
        &self.resolver
    }

    pub fn engine(&self) -> &RetrievalEngine<E, V> {
        &self.engine
    }

    pub async fn generate_question(
        &self,
        session_id: &str,
        input: &str,
        difficulty: Difficulty,
        question_type: QuestionType,
    ) -> TutorResult<QuizTurn> {
        // A new request invalidates whatever the session was answering.
        self.pending.clear(session_id).await?;
        self.log(session_id, "user", input).await?;

        let resolution = self.resolver.resolve(input);
        let retrieval_query = enhance_query(&resolution.query);
        let chunks: Vec<_> = self
            .engine
            .search(&retrieval_query, self.top_k)
            .await?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect();

        tracing::info!(
            session_id,
            chapter = resolution.chapter.as_deref().unwrap_or("-"),
            tier = resolution.tier.map(|t| t.as_str()).unwrap_or("-"),
            chunks = chunks.len(),
            "generating question"
        );

        let topic = if resolution.explicit_chapter || input.trim().is_empty() {
            resolution.query.clone()
        } else {
            input.trim().to_string()
        };
        let request = QuestionRequest {
            query: topic,
            difficulty,
            question_type,
            chapter: resolution
                .chapter
                .as_deref()
                .and_then(|id| self.resolver.catalog().chapter(id))
                .cloned(),
        };

        let question = self.synthesizer.generate(&request, &chunks).await?;
        self.pending.store(session_id, &question).await?;

        let learner_text = question.render_for_learner();
        self.log(session_id, "assistant", &learner_text).await?;

        Ok(QuizTurn {
            question,
            resolution,
            learner_text,
        })
    }

    pub async fn evaluate_answer(
        &self,
        session_id: &str,
        answer: &str,
    ) -> TutorResult<EvaluationResult> {
        self.log(session_id, "user", answer).await?;

        let result = match self.pending.take(session_id).await? {
            Some(question) => evaluate_question(answer, &question),
            None => EvaluationResult {
                is_correct: false,
                message: NO_PENDING_QUESTION.to_string(),
            },
        };

        tracing::info!(session_id, correct = result.is_correct, "answer evaluated");
        self.log(session_id, "assistant", &result.message).await?;
        Ok(result)
    }

    pub async fn explain_concept(&self, input: &str, level: &str) -> TutorResult<ConceptExplanation> {
        let (concept, chunks) = self.concept_context(input).await?;
        ConceptExplainer::new(self.synthesizer.llm())
            .explain(&concept, level, &chunks)
            .await
    }

    pub async fn reexplain_concept(
        &self,
        input: &str,
        feedback: &str,
        level: &str,
    ) -> TutorResult<ConceptReexplanation> {
        let (concept, chunks) = self.concept_context(input).await?;
        ConceptExplainer::new(self.synthesizer.llm())
            .reexplain(&concept, feedback, level, &chunks)
            .await
    }

    async fn concept_context(&self, input: &str) -> TutorResult<(String, Vec<TextChunk>)> {
        let resolution = self.resolver.resolve(input);
        let chunks: Vec<_> = self
            .engine
            .search(&resolution.query, EXPLAIN_TOP_K)
            .await?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect();
        if chunks.is_empty() {
            return Err(TutorError::InsufficientContext {
                query: resolution.query,
            });
        }

        let concept = match input.trim() {
            "" => resolution.query,
            trimmed => trimmed.to_string(),
        };
        Ok((concept, chunks))
    }

    pub fn page_hits(&self, keyword: &str, max_results: usize) -> Vec<PageHit> {
        self.resolver.search_pages(keyword, max_results)
    }

    pub fn search_pages(&self, keyword: &str) -> String {
        format_page_hits(keyword, &self.page_hits(keyword, DEFAULT_PAGE_RESULTS))
    }

    async fn log(&self, session_id: &str, role: &str, content: &str) -> TutorResult<()> {
        if let Some(db) = &self.messages {
            db.save_message(session_id, role, content).await?;
        }
        Ok(())
    }
}

pub fn format_page_hits(keyword: &str, hits: &[PageHit]) -> String {
    if hits.is_empty() {
        return format!("'{}'에 해당하는 키워드를 찾을 수 없습니다.", keyword.trim());
    }

    let mut out = format!("'{}' 검색 결과:\n", keyword.trim());
    for hit in hits {
        let pages = if hit.pages.is_empty() {
            "페이지 정보 없음".to_string()
        } else {
            hit.pages
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match &hit.chapter {
            Some(chapter) => out.push_str(&format!("- {} ({}장): {}\n", hit.word, chapter, pages)),
            None => out.push_str(&format!("- {}: {}\n", hit.word, pages)),
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_catalog;
    use crate::evaluate::UNGRADABLE_QUESTION;
    use crate::explain::DEFAULT_LEVEL;
    use crate::ingest::pdf::MemoryPages;
    use crate::ingest::PdfChunker;
    use crate::quiz::tests::ScriptedModel;
    use crate::quiz::DEGRADED_ANSWER_NOTICE;
    use crate::resolver::MatchTier;
    use crate::retrieval::{HashingEmbedder, MemoryIndex};
    use crate::session::MemorySessions;

    type TestService = TutorService<HashingEmbedder, MemoryIndex, ScriptedModel, MemorySessions>;

    const MC_RESPONSE: &str = "문제: 배열 arr의 길이를 얻는 방법은?\n\
        보기1: arr.size()\n보기2: arr.length\n보기3: arr.length()\n보기4: arr.count()\n\
        정답: 2\n해설: 배열의 길이는 length 필드로 얻는다.";

    fn textbook() -> MemoryPages {
        MemoryPages::from_texts(
            "java.pdf",
            [
                "변수는 값을 저장하는 공간이다. 변수를 선언하면 메모리가 할당된다.",
                "연산자는 연산을 수행하는 기호이다. 산술 연산자에는 더하기와 빼기가 있다.",
                "배열의 길이는 length로 알 수 있다. 배열은 같은 타입의 값을 모은 것이다.",
                "조건문 if는 조건식이 참일 때 블록을 실행한다.",
                "반복문 for는 정해진 횟수만큼 블록을 반복한다.",
            ],
        )
    }

    async fn indexed_engine() -> RetrievalEngine<HashingEmbedder, MemoryIndex> {
        let engine = RetrievalEngine::new(HashingEmbedder::default(), MemoryIndex::new());
        let chunks = PdfChunker::default()
            .process(&textbook(), None)
            .await
            .expect("chunks");
        engine.index_chunks(&chunks).await.expect("index");
        engine
    }

    async fn service(responses: Vec<Result<String, String>>) -> TestService {
        TutorService::new(
            Arc::new(test_catalog()),
            indexed_engine().await,
            ScriptedModel::new(responses),
            MemorySessions::new(),
        )
    }

    #[tokio::test]
    async fn keyword_resolves_and_retrieves_its_page() {
        let service = service(vec![]).await;
        let resolution = service.resolver().resolve("배열");
        assert_eq!(resolution.chapter.as_deref(), Some("5"));
        assert_eq!(resolution.tier, Some(MatchTier::Exact));

        let hits = service
            .engine()
            .search(&resolution.query, 3)
            .await
            .expect("search");
        assert_eq!(hits.first().map(|h| h.chunk.page_number), Some(3));
    }

    #[tokio::test]
    async fn quiz_then_answer_round() {
        let service = service(vec![Ok(MC_RESPONSE.to_string())]).await;
        let turn = service
            .generate_question("s1", "배열", Difficulty::Normal, QuestionType::MultipleChoice)
            .await
            .expect("question");

        assert_eq!(turn.question.options.len(), 4);
        assert_eq!(turn.question.chapter.as_ref().map(|c| c.id.as_str()), Some("5"));
        assert!(turn.learner_text.contains("2. arr.length"));
        assert!(!turn.learner_text.contains("해설"));

        let prompt = service.synthesizer.llm().prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("배열의 길이는 length로"));

        let result = service.evaluate_answer("s1", "②").await.expect("evaluate");
        assert!(result.is_correct);

        let again = service.evaluate_answer("s1", "2").await.expect("evaluate");
        assert!(!again.is_correct);
        assert_eq!(again.message, NO_PENDING_QUESTION);
    }

    #[tokio::test]
    async fn sessions_grade_their_own_question() {
        let short = "문제: int의 크기는?\n정답: 4바이트\n해설: 32비트 정수이다.";
        let service = service(vec![Ok(MC_RESPONSE.to_string()), Ok(short.to_string())]).await;
        service
            .generate_question("a", "배열", Difficulty::Easy, QuestionType::MultipleChoice)
            .await
            .expect("a");
        service
            .generate_question("b", "변수", Difficulty::Easy, QuestionType::ShortAnswer)
            .await
            .expect("b");

        assert!(service.evaluate_answer("b", "4바이트").await.expect("b").is_correct);
        assert!(service.evaluate_answer("a", "b").await.expect("a").is_correct);
    }

    #[tokio::test]
    async fn failed_generation_leaves_nothing_pending() {
        let service = service(vec![
            Ok(MC_RESPONSE.to_string()),
            Err("model offline".to_string()),
        ])
        .await;
        service
            .generate_question("s", "배열", Difficulty::Normal, QuestionType::MultipleChoice)
            .await
            .expect("first");

        let err = service
            .generate_question("s", "변수", Difficulty::Normal, QuestionType::MultipleChoice)
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::Llm(_)));

        let result = service.evaluate_answer("s", "2").await.expect("evaluate");
        assert_eq!(result.message, NO_PENDING_QUESTION);
    }

    #[tokio::test]
    async fn empty_index_is_insufficient_context() {
        let service: TestService = TutorService::new(
            Arc::new(test_catalog()),
            RetrievalEngine::new(HashingEmbedder::default(), MemoryIndex::new()),
            ScriptedModel::replying(MC_RESPONSE),
            MemorySessions::new(),
        );
        let err = service
            .generate_question("s", "배열", Difficulty::Normal, QuestionType::MultipleChoice)
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::InsufficientContext { .. }));

        let err = service.explain_concept("배열", DEFAULT_LEVEL).await.unwrap_err();
        assert!(matches!(err, TutorError::InsufficientContext { .. }));
    }

    #[tokio::test]
    async fn explains_with_retrieved_context() {
        let service = service(vec![Ok("개념명: 배열\n설명: 같은 타입 값의 모음이다.".to_string())]).await;
        let explanation = service
            .explain_concept("배열", DEFAULT_LEVEL)
            .await
            .expect("explanation");
        assert_eq!(explanation.concept_name, "배열");
        assert_eq!(explanation.chunks_used, 5);
    }

    #[tokio::test]
    async fn reexplains_with_learner_feedback() {
        let service = service(vec![Ok("재설명: 배열은 번호 붙은 상자다.\n\
            단순화된설명: 값 묶음\n단계별가이드: 선언한다\n일반적오해: 크기가 변한다\n\
            시각도구: 상자 그림"
            .to_string())])
        .await;
        let result = service
            .reexplain_concept("배열", "인덱스가 헷갈려요", DEFAULT_LEVEL)
            .await
            .expect("re-explanation");
        assert_eq!(result.concept_name, "배열");
        assert_eq!(result.chunks_used, 5);
        assert!(result.degraded_fields.is_empty());

        let prompt = service.synthesizer.llm().prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("인덱스가 헷갈려요"));
    }

    #[tokio::test]
    async fn degraded_answer_is_flagged_and_not_graded() {
        let service = service(vec![Ok("문제: 배열의 첫 인덱스는?\n해설: 0부터 시작한다.".to_string())]).await;
        let turn = service
            .generate_question("d", "배열", Difficulty::Normal, QuestionType::ShortAnswer)
            .await
            .expect("question");
        assert!(turn.question.has_degraded("correct_answer"));
        assert!(turn.learner_text.contains(DEGRADED_ANSWER_NOTICE));

        let result = service.evaluate_answer("d", "0").await.expect("evaluate");
        assert!(!result.is_correct);
        assert_eq!(result.message, UNGRADABLE_QUESTION);
    }

    #[tokio::test]
    async fn exchanges_are_logged_when_enabled() {
        let db = Database::in_memory().await.expect("db");
        let service = service(vec![Ok(MC_RESPONSE.to_string())])
            .await
            .with_message_log(db.clone());
        service
            .generate_question("log", "배열", Difficulty::Normal, QuestionType::MultipleChoice)
            .await
            .expect("question");
        service.evaluate_answer("log", "1").await.expect("evaluate");

        let messages = db.latest_messages("log", 10).await.expect("messages");
        let roles: Vec<&str> = messages.iter().map(|(role, _)| role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
        assert!(messages[3].1.contains("오답입니다"));
    }

    #[test]
    fn page_hits_are_formatted() {
        let hits = vec![
            PageHit {
                word: "배열".to_string(),
                pages: vec![4],
                chapter: Some("5".to_string()),
            },
            PageHit {
                word: "형변환".to_string(),
                pages: vec![],
                chapter: None,
            },
        ];
        assert_eq!(
            format_page_hits("배열", &hits),
            "'배열' 검색 결과:\n- 배열 (5장): 4\n- 형변환: 페이지 정보 없음"
        );
        assert_eq!(
            format_page_hits("없음", &[]),
            "'없음'에 해당하는 키워드를 찾을 수 없습니다."
        );
    }
}
